//! Linear regression trained by stochastic gradient descent.
//!
//! Supports a weighted multi-epoch fit over a full dataset and a one-pass
//! `partial_fit` for streaming training. Both share the same update rule:
//! squared loss, L2 penalty, inverse-scaling learning rate
//! `eta = eta0 / (t + 1)^power_t` where `t` counts updates over the model's
//! lifetime.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    pub eta0: f64,
    pub power_t: f64,
    pub alpha: f64,
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            eta0: 0.01,
            power_t: 0.25,
            alpha: 1e-4,
            epochs: 30,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdRegressor {
    coef: Vec<f64>,
    intercept: f64,
    updates: u64,
    config: SgdConfig,
}

impl SgdRegressor {
    pub fn new(n_features: usize, config: SgdConfig) -> Self {
        Self {
            coef: vec![0.0; n_features],
            intercept: 0.0,
            updates: 0,
            config,
        }
    }

    pub fn n_features(&self) -> usize {
        self.coef.len()
    }

    pub fn coef(&self) -> &[f64] {
        &self.coef
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    /// Fit from scratch with per-sample weights.
    ///
    /// Weights are normalised to mean 1 so they only shift emphasis between
    /// samples, not the effective step size. Sample order per epoch is a
    /// shuffle driven by `config.seed`.
    pub fn fit_weighted(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        weights: ArrayView1<'_, f64>,
    ) -> Result<(), AppError> {
        self.check_shapes(x, y)?;
        if weights.len() != y.len() {
            return Err(AppError::Validation(format!(
                "got {} sample weights for {} samples",
                weights.len(),
                y.len()
            )));
        }
        if y.is_empty() {
            return Err(AppError::EmptyDataset);
        }

        let total: f64 = weights.sum();
        if !(total.is_finite() && total > 0.0) || weights.iter().any(|w| *w < 0.0) {
            return Err(AppError::Validation("sample weights must be non-negative with a positive sum".into()));
        }
        let norm = y.len() as f64 / total;

        self.coef.iter_mut().for_each(|c| *c = 0.0);
        self.intercept = 0.0;
        self.updates = 0;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut order: Vec<usize> = (0..y.len()).collect();
        for _ in 0..self.config.epochs.max(1) {
            order.shuffle(&mut rng);
            for &i in &order {
                self.step(x.row(i), y[i], weights[i] * norm);
            }
        }

        self.ensure_finite()
    }

    /// One in-order pass over a batch, continuing from the current parameters.
    pub fn partial_fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), AppError> {
        self.check_shapes(x, y)?;
        for i in 0..y.len() {
            self.step(x.row(i), y[i], 1.0);
        }
        self.ensure_finite()
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, AppError> {
        if x.ncols() != self.n_features() {
            return Err(AppError::Validation(format!(
                "model expects {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        Ok(x.rows().into_iter().map(|row| self.predict_view(row)).collect())
    }

    pub fn predict_row(&self, row: &[f64]) -> Result<f64, AppError> {
        if row.len() != self.n_features() {
            return Err(AppError::Validation(format!(
                "model expects {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        Ok(self.predict_view(ArrayView1::from(row)))
    }

    fn predict_view(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.intercept + row.iter().zip(&self.coef).map(|(x, c)| x * c).sum::<f64>()
    }

    fn step(&mut self, row: ArrayView1<'_, f64>, target: f64, weight: f64) {
        let eta = self.config.eta0 / ((self.updates + 1) as f64).powf(self.config.power_t);
        let err = self.predict_view(row) - target;
        let alpha = self.config.alpha;
        for (c, x) in self.coef.iter_mut().zip(row.iter()) {
            *c -= eta * (weight * err * x + alpha * *c);
        }
        self.intercept -= eta * weight * err;
        self.updates += 1;
    }

    fn check_shapes(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), AppError> {
        if x.ncols() != self.n_features() {
            return Err(AppError::Validation(format!(
                "model expects {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        if x.nrows() != y.len() {
            return Err(AppError::Validation(format!(
                "feature matrix has {} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        Ok(())
    }

    fn ensure_finite(&self) -> Result<(), AppError> {
        if self.intercept.is_finite() && self.coef.iter().all(|c| c.is_finite()) {
            Ok(())
        } else {
            Err(AppError::Validation("model parameters diverged to non-finite values".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        // roughly unit variance, the scale the scaler hands the model
        let x = Array2::from_shape_fn((n, 1), |(i, _)| ((i as f64 / n as f64) * 2.0 - 1.0) * 1.7);
        let y = x.column(0).mapv(|v| 3.0 * v + 2.0);
        (x, y)
    }

    #[test]
    fn test_fit_weighted_recovers_linear_relation() {
        let (x, y) = linear_data(200);
        let w = Array1::ones(200);
        let mut model = SgdRegressor::new(1, SgdConfig::default());
        model.fit_weighted(x.view(), y.view(), w.view()).unwrap();

        assert!((model.coef()[0] - 3.0).abs() < 0.1, "coef = {}", model.coef()[0]);
        assert!((model.intercept() - 2.0).abs() < 0.1, "intercept = {}", model.intercept());
    }

    #[test]
    fn test_fit_weighted_is_deterministic_for_seed() {
        let (x, y) = linear_data(50);
        let w = Array1::from_shape_fn(50, |i| (i + 1) as f64);
        let mut a = SgdRegressor::new(1, SgdConfig::default());
        let mut b = SgdRegressor::new(1, SgdConfig::default());
        a.fit_weighted(x.view(), y.view(), w.view()).unwrap();
        b.fit_weighted(x.view(), y.view(), w.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_partial_fit_accumulates_updates() {
        let (x, y) = linear_data(20);
        let mut model = SgdRegressor::new(1, SgdConfig::default());
        model.partial_fit(x.view(), y.view()).unwrap();
        assert_eq!(model.updates(), 20);
        let first = model.clone();
        model.partial_fit(x.view(), y.view()).unwrap();
        assert_eq!(model.updates(), 40);
        assert_ne!(first.intercept(), model.intercept());
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mut model = SgdRegressor::new(2, SgdConfig::default());
        let x = Array2::<f64>::zeros((3, 1));
        let y = Array1::<f64>::zeros(3);
        assert!(model.partial_fit(x.view(), y.view()).is_err());
        assert!(model.predict_row(&[1.0]).is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let (x, y) = linear_data(5);
        let w = Array1::zeros(5);
        let mut model = SgdRegressor::new(1, SgdConfig::default());
        assert!(model.fit_weighted(x.view(), y.view(), w.view()).is_err());
    }
}
