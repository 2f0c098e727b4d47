//! Parameter bound overrides.
//!
//! Overrides map a glob pattern to either `[default, lo, hi]` (new bounds) or
//! `[value]` (fix the parameter). Patterns are matched against parameter
//! display names such as `mean1`, `c2` or `a3`.
//!
//! Matching rules:
//!
//! - Patterns use `glob` syntax: `*` matches any run of characters, `?` one
//!   character and `[...]` one character of a class.
//! - A pattern without wildcards must equal the name and beats every glob.
//! - Among globs, the pattern with the most literal characters wins.
//! - Two different globs tied for the win is an error (ambiguous override).
//! - A pattern that matches nothing is allowed: parameter sets differ per order.

use std::collections::BTreeMap;

use glob::Pattern;

use crate::domain::Parameter;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Override {
    Bounds { default: f64, lo: f64, hi: f64 },
    Fixed(f64),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    exact: bool,
    literal: usize,
    action: Override,
}

#[derive(Debug, Clone, Default)]
pub struct BoundsOverrides {
    rules: Vec<Rule>,
}

impl BoundsOverrides {
    pub fn from_table(table: &BTreeMap<String, Vec<f64>>) -> Result<Self, AppError> {
        let mut rules = Vec::with_capacity(table.len());
        for (pattern, values) in table {
            if pattern.is_empty() {
                return Err(AppError::config("Empty bounds override pattern."));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(AppError::config(format!(
                    "Bounds override '{pattern}' contains non-finite values."
                )));
            }
            let action = match values.as_slice() {
                [v] => Override::Fixed(*v),
                [default, lo, hi] => {
                    if !(lo < hi && (*lo..=*hi).contains(default)) {
                        return Err(AppError::config(format!(
                            "Bounds override '{pattern}' needs lo < hi and lo <= default <= hi, got {values:?}."
                        )));
                    }
                    Override::Bounds {
                        default: *default,
                        lo: *lo,
                        hi: *hi,
                    }
                }
                _ => {
                    return Err(AppError::config(format!(
                        "Bounds override '{pattern}' must be [value] or [default, lo, hi], got {} values.",
                        values.len()
                    )));
                }
            };
            let compiled = Pattern::new(pattern)
                .map_err(|e| AppError::config(format!("Invalid bounds override pattern '{pattern}': {e}")))?;
            rules.push(Rule {
                exact: !pattern.contains(['*', '?', '[']),
                literal: literal_len(pattern),
                pattern: compiled,
                action,
            });
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the winning rule (if any) to each parameter.
    pub fn apply(&self, params: &mut [Parameter]) -> Result<(), AppError> {
        for p in params.iter_mut() {
            let Some(rule) = self.winner(&p.name)? else {
                continue;
            };
            match rule {
                Override::Bounds { default, lo, hi } => {
                    p.value = default;
                    p.lo = lo;
                    p.hi = hi;
                    p.constant = false;
                }
                Override::Fixed(v) => {
                    p.value = v;
                    p.lo = p.lo.min(v);
                    p.hi = p.hi.max(v);
                    p.constant = true;
                }
            }
        }
        Ok(())
    }

    fn winner(&self, name: &str) -> Result<Option<Override>, AppError> {
        if let Some(rule) = self.rules.iter().find(|r| r.exact && r.pattern.as_str() == name) {
            return Ok(Some(rule.action));
        }

        let mut best: Option<&Rule> = None;
        let mut tied: Option<&Rule> = None;
        for rule in self.rules.iter().filter(|r| !r.exact && r.pattern.matches(name)) {
            match best {
                Some(b) if rule.literal < b.literal => {}
                Some(b) if rule.literal == b.literal => {
                    tied = Some(b);
                    best = Some(rule);
                }
                _ => {
                    tied = None;
                    best = Some(rule);
                }
            }
        }

        if let (Some(other), Some(rule)) = (tied, best) {
            return Err(AppError::config(format!(
                "Ambiguous bounds override for parameter '{name}': '{}' and '{}' match equally well.",
                other.pattern, rule.pattern
            )));
        }
        Ok(best.map(|r| r.action))
    }
}

/// Characters of `pattern` outside `*`, `?` and `[...]` classes.
fn literal_len(pattern: &str) -> usize {
    let mut count = 0;
    let mut in_class = false;
    for c in pattern.chars() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '*' | '?' if !in_class => {}
            _ if in_class => {}
            _ => count += 1,
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &[f64])]) -> BTreeMap<String, Vec<f64>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    fn params() -> Vec<Parameter> {
        vec![
            Parameter::free("mean1", 125.0, 120.0, 130.0),
            Parameter::free("sigma1", 1.5, 1.0, 5.0),
            Parameter::free("mean2", 125.0, 120.0, 130.0),
            Parameter::free("c1", 0.5, 0.0, 1.0),
        ]
    }

    #[test]
    fn literal_length_skips_wildcards_and_classes() {
        assert_eq!(literal_len("mean*"), 4);
        assert_eq!(literal_len("*ean?"), 3);
        assert_eq!(literal_len("mean[12]"), 4);
        assert_eq!(literal_len("*"), 0);
    }

    #[test]
    fn question_mark_and_classes_are_glob_syntax() {
        let o = BoundsOverrides::from_table(&table(&[
            ("mean[2]", &[126.0, 121.0, 129.0]),
            ("sigma?", &[2.0, 1.5, 3.0]),
        ]))
        .unwrap();
        let mut p = params();
        o.apply(&mut p).unwrap();
        assert_eq!((p[0].lo, p[0].hi), (120.0, 130.0));
        assert_eq!((p[1].lo, p[1].hi), (1.5, 3.0));
        assert_eq!((p[2].lo, p[2].hi), (121.0, 129.0));
    }

    #[test]
    fn malformed_pattern_is_a_config_error() {
        assert!(matches!(
            BoundsOverrides::from_table(&table(&[("mean[", &[124.0, 123.0, 127.0])])),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn exact_beats_glob_and_longer_glob_beats_shorter() {
        let o = BoundsOverrides::from_table(&table(&[
            ("mean*", &[124.0, 123.0, 127.0]),
            ("mean2", &[126.0]),
            ("*", &[0.5, 0.0, 200.0]),
        ]))
        .unwrap();
        let mut p = params();
        o.apply(&mut p).unwrap();
        assert_eq!((p[0].lo, p[0].hi, p[0].value), (123.0, 127.0, 124.0));
        assert!(p[2].constant && p[2].value == 126.0);
        // Only "*" matches sigma1 and c1.
        assert_eq!((p[1].lo, p[1].hi), (0.0, 200.0));
        assert_eq!(p[3].hi, 200.0);
    }

    #[test]
    fn equally_specific_globs_are_ambiguous() {
        let o = BoundsOverrides::from_table(&table(&[
            ("mean*", &[124.0, 123.0, 127.0]),
            ("*ean1", &[124.0, 120.0, 128.0]),
        ]))
        .unwrap();
        let mut p = params();
        assert!(matches!(o.apply(&mut p), Err(AppError::Config(_))));
    }

    #[test]
    fn invalid_override_shapes_are_rejected() {
        assert!(BoundsOverrides::from_table(&table(&[("a*", &[1.0, 2.0])])).is_err());
        assert!(BoundsOverrides::from_table(&table(&[("a*", &[5.0, 0.0, 1.0])])).is_err());
    }
}
