//! Read/write binned dataset JSON files.
//!
//! Schema: `{ "edges": [...], "counts": [...] }`, validated on read.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::data::BinnedDataset;
use crate::error::AppError;

pub fn read_dataset_json(path: &Path) -> Result<BinnedDataset, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open dataset '{}': {e}", path.display())))?;
    let data: BinnedDataset = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::data(format!("Invalid dataset JSON '{}': {e}", path.display())))?;
    data.validate()?;
    Ok(data)
}

pub fn write_dataset_json(path: &Path, data: &BinnedDataset) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create dataset '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, data)
        .map_err(|e| AppError::io(format!("Failed to write dataset JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_survives_a_file_round_trip() {
        let path = std::env::temp_dir().join(format!("envfit-dataset-{}.json", std::process::id()));
        let data = BinnedDataset::new(vec![100.0, 110.0, 130.0], vec![4.0, 7.0]).unwrap();
        write_dataset_json(&path, &data).unwrap();
        let back = read_dataset_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, data);
    }

    #[test]
    fn malformed_dataset_is_a_data_error() {
        let path = std::env::temp_dir().join(format!("envfit-bad-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"edges": [1.0, 0.0], "counts": [3.0]}"#).unwrap();
        let err = read_dataset_json(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, AppError::Data(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_dataset_json(Path::new("/nonexistent/envfit.json")).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
