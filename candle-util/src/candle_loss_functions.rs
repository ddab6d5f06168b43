use candle_core::{Result, Tensor, D};

use crate::candle_linalg::{tril_log_abs_det, tril_solve};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Element-wise Gaussian log density
///
/// log N(x; μ, σ²) = -0.5 * ((x - μ)/σ)² - log σ - 0.5 * log(2π)
///
/// * `x` - observed values
/// * `mean` - mean μ (broadcast against `x`)
/// * `sd` - standard deviation σ (broadcast against `x`)
///
pub fn gaussian_log_density(x: &Tensor, mean: &Tensor, sd: &Tensor) -> Result<Tensor> {
    let z = x.broadcast_sub(mean)?.broadcast_div(sd)?;
    let quad = (z.sqr()? * (-0.5))?;
    quad.broadcast_sub(&sd.log()?)? - 0.5 * LN_2PI
}

/// Multivariate Gaussian log density with a lower-triangular scale
///
/// log N(x; μ, L Lᵀ) = -0.5 |L⁻¹(x - μ)|² - log|det L| - p/2 log(2π)
///
/// * `x` - samples `(..., B, p)`
/// * `mean` - mean `(..., B, p)` (broadcast against `x`)
/// * `scale_tril` - `(B, p, p)`
///
/// Returns `(..., B)`
pub fn mvn_tril_log_density(x: &Tensor, mean: &Tensor, scale_tril: &Tensor) -> Result<Tensor> {
    let p = scale_tril.dim(D::Minus1)?;
    let resid = x.broadcast_sub(mean)?;
    let z = tril_solve(scale_tril, &resid)?;
    let quad = (z.sqr()?.sum(D::Minus1)? * (-0.5))?;
    let log_det = tril_log_abs_det(scale_tril)?;
    quad.broadcast_sub(&log_det)? - 0.5 * (p as f64) * LN_2PI
}

/// Logit of values in (0, 1) with both `y` and `1 - y` clamped
/// below at `floor`
pub fn clamped_logit(y: &Tensor, floor: f64) -> Result<Tensor> {
    let y_lo = y.clamp(floor, 1.0)?;
    let y_hi = y.affine(-1.0, 1.0)?.clamp(floor, 1.0)?;
    y_lo.log()?.sub(&y_hi.log()?)
}

/// Entropy of a diagonal Gaussian with standard deviations `sd`
///
/// H = Σ_j log σ_j + p/2 (1 + log 2π)
///
pub fn gaussian_entropy(sd: &[f32]) -> f32 {
    let p = sd.len() as f32;
    sd.iter().map(|s| s.ln()).sum::<f32>() + 0.5 * p * (1.0 + LN_2PI as f32)
}
