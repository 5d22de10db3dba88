//! Shared utilities: descriptive statistics and confidence intervals.

pub mod stats;

pub use stats::{margin_of_error, nan_mean, nan_std, student_t_quantile};
