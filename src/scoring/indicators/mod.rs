pub mod adf;
pub mod adx;
pub mod atr;
pub mod hurst;
pub mod volume_cv;

pub use adf::adf_p_value;
pub use adx::calculate_adx;
pub use atr::{calculate_atr, calculate_atr_pct};
pub use hurst::hurst_exponent;
pub use volume_cv::volume_coefficient_of_variation;
