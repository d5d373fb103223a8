//! Loading the labeled sensor tables into feature matrices.

use std::path::Path;

use csv::ReaderBuilder;
use linfa::Dataset;
use ndarray::{Array1, Array2, Axis, Ix1};

use crate::error::{Error, Result};

/// Column holding the binary failure label.
pub const TARGET_COLUMN: &str = "Target";

/// Identifier and label columns that never reach the classifier.
pub const DROPPED_COLUMNS: [&str; 5] = ["Target", "Failure Type", "UDI", "Product ID", "Type"];

/// Number of sensor readings a record must carry.
pub const FEATURE_COUNT: usize = 5;

/// Sensor readings and their failure labels, one row per machine record.
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub records: Array2<f64>,
    pub targets: Array1<usize>,
    pub feature_names: Vec<String>,
}

impl LabeledData {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers = reader.headers()?.clone();

        let target_idx = headers
            .iter()
            .position(|h| h.trim() == TARGET_COLUMN)
            .ok_or_else(|| {
                Error::training(format!("{}: missing `{TARGET_COLUMN}` column", path.display()))
            })?;
        let feature_idx: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !DROPPED_COLUMNS.contains(&h.trim()))
            .map(|(i, _)| i)
            .collect();
        if feature_idx.len() != FEATURE_COUNT {
            return Err(Error::training(format!(
                "{}: expected {FEATURE_COUNT} feature columns, found {}",
                path.display(),
                feature_idx.len()
            )));
        }
        let feature_names = feature_idx
            .iter()
            .map(|&i| headers[i].trim().to_string())
            .collect();

        let mut values = Vec::new();
        let mut targets = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            for &i in &feature_idx {
                let cell = record.get(i).unwrap_or("");
                let value: f64 = cell.trim().parse().map_err(|_| {
                    Error::training(format!(
                        "row {}: `{}` is not a number in column `{}`",
                        row + 1,
                        cell,
                        &headers[i]
                    ))
                })?;
                values.push(value);
            }
            let label = record.get(target_idx).unwrap_or("");
            targets.push(parse_label(label).ok_or_else(|| {
                Error::training(format!("row {}: invalid target `{label}`", row + 1))
            })?);
        }

        let records = Array2::from_shape_vec((targets.len(), FEATURE_COUNT), values)
            .map_err(Error::training)?;
        Ok(Self {
            records,
            targets: Array1::from(targets),
            feature_names,
        })
    }

    pub fn nsamples(&self) -> usize {
        self.targets.len()
    }

    pub fn nfeatures(&self) -> usize {
        self.records.ncols()
    }

    /// Rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            records: self.records.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }

    /// A linfa dataset restricted to the given feature columns.
    pub fn to_dataset(&self, features: &[usize]) -> Dataset<f64, usize, Ix1> {
        let names = features
            .iter()
            .map(|&i| self.feature_names[i].clone())
            .collect();
        Dataset::new(self.records.select(Axis(1), features), self.targets.clone())
            .with_feature_names(names)
    }
}

fn parse_label(cell: &str) -> Option<usize> {
    match cell.trim() {
        "0" | "0.0" => Some(0),
        "1" | "1.0" => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    const HEADER: &str = "UDI,Product ID,Type,Air temperature [K],Process temperature [K],Rotational speed [rpm],Torque [Nm],Tool wear [min],Target,Failure Type\n";

    #[test]
    fn drops_identifier_and_label_columns() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{HEADER}1,M14860,M,298.1,308.6,1551,42.8,0,0,No Failure\n2,L47181,L,298.2,308.7,1408,46.3,3,1,Power Failure\n"
        );
        let path = write_csv(dir.path(), "data.csv", &body);

        let data = LabeledData::from_csv(&path).unwrap();
        assert_eq!(data.nsamples(), 2);
        assert_eq!(data.nfeatures(), FEATURE_COUNT);
        assert_eq!(data.feature_names[0], "Air temperature [K]");
        assert_eq!(data.feature_names[4], "Tool wear [min]");
        assert_eq!(data.records[[1, 2]], 1408.0);
        assert_eq!(data.targets.to_vec(), vec![0, 1]);
    }

    #[test]
    fn rejects_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "data.csv", "a,b,c,d,e\n1,2,3,4,5\n");
        let err = LabeledData::from_csv(&path).unwrap_err();
        assert!(matches!(err, Error::Training(_)));
    }

    #[test]
    fn rejects_non_binary_target() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("{HEADER}1,M14860,M,298.1,308.6,1551,42.8,0,2,No Failure\n");
        let path = write_csv(dir.path(), "data.csv", &body);
        let err = LabeledData::from_csv(&path).unwrap_err();
        assert!(err.to_string().contains("invalid target"));
    }

    #[test]
    fn rejects_non_numeric_feature() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("{HEADER}1,M14860,M,hot,308.6,1551,42.8,0,0,No Failure\n");
        let path = write_csv(dir.path(), "data.csv", &body);
        let err = LabeledData::from_csv(&path).unwrap_err();
        assert!(err.to_string().contains("is not a number"));
    }

    #[test]
    fn subset_and_projection_keep_alignment() {
        let data = LabeledData {
            records: ndarray::array![[1., 2., 3., 4., 5.], [6., 7., 8., 9., 10.]],
            targets: ndarray::array![0, 1],
            feature_names: (0..5).map(|i| format!("f{i}")).collect(),
        };
        let picked = data.subset(&[1]);
        assert_eq!(picked.targets.to_vec(), vec![1]);
        assert_eq!(picked.records[[0, 0]], 6.);

        let ds = data.to_dataset(&[3, 4]);
        assert_eq!(ds.records().ncols(), 2);
        assert_eq!(ds.records()[[1, 0]], 9.);
    }
}
