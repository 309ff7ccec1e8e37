use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Training set consumed by the fitness engine
///
/// `X` and `y` are row-major with one row per sample; `y` carries one column
/// per output channel (a single column for scalar regression targets).
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Data {
    pub X: Vec<Vec<f64>>,
    pub y: Vec<Vec<f64>>,
    pub features: Vec<String>,
    pub samples: Vec<String>,
    pub targets: Vec<String>,
    pub feature_len: usize,
    pub sample_len: usize,
    pub target_len: usize,
}

impl Data {
    /// Create a new `Data` instance with default values
    pub fn new() -> Data {
        Data {
            X: Vec::new(),
            y: Vec::new(),
            features: Vec::new(),
            samples: Vec::new(),
            targets: Vec::new(),
            feature_len: 0,
            sample_len: 0,
            target_len: 0,
        }
    }

    /// Builds a `Data` directly from in-memory matrices, naming features and
    /// targets `x{i}` / `y{i}`. Used by tests and programmatic callers.
    pub fn from_matrices(X: Vec<Vec<f64>>, y: Vec<Vec<f64>>) -> Data {
        let feature_len = X.first().map(|row| row.len()).unwrap_or(0);
        let target_len = y.first().map(|row| row.len()).unwrap_or(0);
        let sample_len = X.len();
        Data {
            features: (0..feature_len).map(|i| format!("x{}", i)).collect(),
            targets: (0..target_len).map(|i| format!("y{}", i)).collect(),
            samples: (0..sample_len).map(|i| format!("s{}", i)).collect(),
            X,
            y,
            feature_len,
            sample_len,
            target_len,
        }
    }

    /// Load data from `X.tsv` and `y.tsv` files
    ///
    /// With `features_in_rows` the files carry one feature (resp. target) per
    /// row, a name in the first column and a header line of sample names; the
    /// matrices are transposed to sample-major on load. Otherwise rows are
    /// samples with a feature-name header and the sample name in the first
    /// column.
    pub fn load_data(
        &mut self,
        X_path: &str,
        y_path: &str,
        features_in_rows: bool,
    ) -> Result<(), Box<dyn Error>> {
        info!("Loading files {} and {}...", X_path, y_path);
        let (samples, features, X) = read_tsv(X_path, features_in_rows)?;
        let (_, targets, y) = read_tsv(y_path, features_in_rows)?;

        if y.len() != X.len() {
            return Err(format!(
                "{} has {} samples but {} has {}",
                X_path,
                X.len(),
                y_path,
                y.len()
            )
            .into());
        }

        self.samples = samples;
        self.features = features;
        self.targets = targets;
        self.feature_len = X.first().map(|row| row.len()).unwrap_or(0);
        self.target_len = y.first().map(|row| row.len()).unwrap_or(0);
        self.sample_len = X.len();
        self.X = X;
        self.y = y;

        info!(
            "Loaded {} samples, {} features, {} targets",
            self.sample_len, self.feature_len, self.target_len
        );
        Ok(())
    }
}

/// Reads one TSV matrix, returning (sample names, variable names, sample-major values)
fn read_tsv(
    path: &str,
    variables_in_rows: bool,
) -> Result<(Vec<String>, Vec<String>, Vec<Vec<f64>>), Box<dyn Error>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(format!("{} is empty", path).into()),
    };
    let header_names: Vec<String> = header
        .trim_end_matches(['\n', '\r'])
        .split('\t')
        .skip(1)
        .map(String::from)
        .collect();

    let mut row_names = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for line in lines {
        let line = line?;
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        let mut fields = trimmed.split('\t');
        if let Some(name) = fields.next() {
            row_names.push(name.to_string());
        }
        let values = fields
            .map(|field| field.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(values);
    }

    if variables_in_rows {
        // header = sample names, rows = variables: transpose to sample-major
        let transposed = (0..header_names.len())
            .map(|s| rows.iter().map(|row| row[s]).collect())
            .collect();
        Ok((header_names, row_names, transposed))
    } else {
        Ok((row_names, header_names, rows))
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data with {} samples, {} features and {} targets (features: {}...)",
            self.sample_len,
            self.feature_len,
            self.target_len,
            self.features
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<String>>()
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_matrices() {
        let data = Data::from_matrices(
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
            vec![vec![1.0], vec![2.0], vec![3.0]],
        );
        assert_eq!(data.sample_len, 3);
        assert_eq!(data.feature_len, 2);
        assert_eq!(data.target_len, 1);
        assert_eq!(data.features, vec!["x0", "x1"]);
    }

    #[test]
    fn test_load_data_features_in_rows() {
        let dir = std::env::temp_dir();
        let x_path = dir.join("nsgp_test_X.tsv");
        let y_path = dir.join("nsgp_test_y.tsv");
        let mut fx = File::create(&x_path).unwrap();
        writeln!(fx, "feature\tsampleA\tsampleB").unwrap();
        writeln!(fx, "x0\t1.0\t2.0").unwrap();
        writeln!(fx, "x1\t3.0\t4.0").unwrap();
        let mut fy = File::create(&y_path).unwrap();
        writeln!(fy, "target\tsampleA\tsampleB").unwrap();
        writeln!(fy, "y0\t10.0\t20.0").unwrap();

        let mut data = Data::new();
        data.load_data(
            x_path.to_str().unwrap(),
            y_path.to_str().unwrap(),
            true,
        )
        .unwrap();

        assert_eq!(data.sample_len, 2);
        assert_eq!(data.feature_len, 2);
        assert_eq!(data.samples, vec!["sampleA", "sampleB"]);
        assert_eq!(data.X, vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
        assert_eq!(data.y, vec![vec![10.0], vec![20.0]]);
    }
}
