use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Column-wise standardisation: `(x - mean) / scale`.
///
/// Parameters are fixed at construction; a fitted scaler is only ever applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
    n_samples_seen: usize,
}

impl StandardScaler {
    /// Fit on a feature matrix (population standard deviation).
    /// Columns with zero variance get a scale of 1.
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self, AppError> {
        if x.nrows() == 0 {
            return Err(AppError::EmptyDataset);
        }
        if x.ncols() == 0 {
            return Err(AppError::Validation("cannot fit scaler on zero columns".into()));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or(AppError::EmptyDataset)?
            .to_vec();
        let scale = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|s| if s.is_finite() && *s > 1e-12 { *s } else { 1.0 })
            .collect();

        Ok(Self {
            mean,
            scale,
            n_samples_seen: x.nrows(),
        })
    }

    /// Sanity checks for parameters that came from disk rather than `fit`.
    pub fn check_consistent(&self) -> Result<(), String> {
        if self.mean.len() != self.scale.len() {
            return Err(format!(
                "scaler mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            ));
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scaler contains a non-positive or non-finite scale".into());
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err("scaler contains a non-finite mean".into());
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn n_samples_seen(&self) -> usize {
        self.n_samples_seen
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, AppError> {
        self.check_width(x.ncols())?;
        let mut out = x.to_owned();
        for (j, mut col) in out.columns_mut().into_iter().enumerate() {
            let (mean, scale) = (self.mean[j], self.scale[j]);
            col.mapv_inplace(|v| (v - mean) / scale);
        }
        Ok(out)
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, AppError> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (mean, scale))| (v - mean) / scale)
            .collect())
    }

    fn check_width(&self, actual: usize) -> Result<(), AppError> {
        if actual != self.n_features() {
            return Err(AppError::ScalerDimensionMismatch {
                expected: self.n_features(),
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_computes_mean_and_population_std() {
        let x = array![[1.0, 10.0], [3.0, 10.0]];
        let scaler = StandardScaler::fit(x.view()).unwrap();
        assert_eq!(scaler.mean(), &[2.0, 10.0]);
        assert!((scaler.scale()[0] - 1.0).abs() < 1e-12);
        // constant column falls back to unit scale
        assert_eq!(scaler.scale()[1], 1.0);
        assert_eq!(scaler.n_samples_seen(), 2);
    }

    #[test]
    fn test_transform_standardises_columns() {
        let x = array![[0.0], [2.0], [4.0]];
        let scaler = StandardScaler::fit(x.view()).unwrap();
        let t = scaler.transform(x.view()).unwrap();
        assert!(t[[1, 0]].abs() < 1e-12);
        assert!((t[[0, 0]] + t[[2, 0]]).abs() < 1e-12);
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = StandardScaler::fit(array![[1.0, 2.0]].view()).unwrap();
        let err = scaler.transform(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(
            err,
            AppError::ScalerDimensionMismatch { expected: 2, actual: 3 }
        ));
        assert!(scaler.transform_row(&[1.0]).is_err());
    }

    #[test]
    fn test_fit_on_empty_matrix_is_empty_dataset() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(matches!(StandardScaler::fit(x.view()), Err(AppError::EmptyDataset)));
    }

    #[test]
    fn test_check_consistent_rejects_bad_parameters() {
        let uneven: StandardScaler =
            serde_json::from_str(r#"{"mean":[0.0,1.0],"scale":[1.0],"n_samples_seen":3}"#).unwrap();
        assert!(uneven.check_consistent().is_err());
        let zero_scale: StandardScaler =
            serde_json::from_str(r#"{"mean":[0.0],"scale":[0.0],"n_samples_seen":3}"#).unwrap();
        assert!(zero_scale.check_consistent().is_err());
        let fitted = StandardScaler::fit(array![[1.0], [3.0]].view()).unwrap();
        assert!(fitted.check_consistent().is_ok());
    }
}
