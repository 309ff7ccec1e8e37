use statrs::statistics::Statistics;

/// Population covariance between two equally long series
///
/// Uses the same n denominator as `population_variance`, so the ratio
/// `cov(t, o) / var(o)` is the exact least-squares slope.
pub fn covariance(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n == 0 {
        return 0.0;
    }
    let mean_x = x.mean();
    let mean_y = y.mean();
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| (a - mean_x) * (b - mean_y))
        .sum::<f64>()
        / n as f64
}

/// Mean of the squared differences between two equally long series
pub fn mean_squared_difference(target: &[f64], prediction: &[f64]) -> f64 {
    target
        .iter()
        .zip(prediction.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>()
        / target.len() as f64
}

/// Condensed pairwise Euclidean distances between the rows of a matrix
///
/// Row pairs are emitted in (i, j) order with i < j, matching the usual
/// condensed distance layout.
pub fn pairwise_distances(rows: &[Vec<f64>]) -> Vec<f64> {
    let n = rows.len();
    let mut distances = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = rows[i]
                .iter()
                .zip(rows[j].iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            distances.push(d);
        }
    }
    distances
}

/// Extracts column `j` of a row-major matrix
pub fn column(matrix: &[Vec<f64>], j: usize) -> Vec<f64> {
    matrix.iter().map(|row| row[j]).collect()
}
