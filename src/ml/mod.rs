//! Numeric building blocks for the price regressor.

pub mod scaler;
pub mod sgd;

pub use scaler::StandardScaler;
pub use sgd::{SgdConfig, SgdRegressor};
