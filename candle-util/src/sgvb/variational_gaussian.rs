use candle_core::{DType, Device, Result, Tensor};
use candle_nn::VarBuilder;

use crate::candle_linalg::softplus;

use super::traits::VariationalDistribution;

/// Gaussian variational distribution q(θ) = N(μ, diag(σ²))
///
/// Mean-field approximation. Parameters are stored as the mean μ and
/// an unconstrained scale s with σ = softplus(s).
pub struct GaussianVar {
    /// Variational mean μ: shape (p,)
    mean: Tensor,
    /// Unconstrained scale s: shape (p,)
    raw_std: Tensor,
}

impl GaussianVar {
    /// Create a new Gaussian variational distribution.
    ///
    /// # Arguments
    /// * `vb` - VarBuilder for creating trainable parameters
    /// * `p` - Number of coefficients
    /// * `init_mean` - Initial value of every μ_j
    /// * `init_raw_std` - Initial value of every s_j (σ_j = softplus(s_j))
    pub fn new(vb: VarBuilder, p: usize, init_mean: f64, init_raw_std: f64) -> Result<Self> {
        let mean = vb.get_with_hints(p, "mean", candle_nn::Init::Const(init_mean))?;
        let raw_std = vb.get_with_hints(p, "raw_std", candle_nn::Init::Const(init_raw_std))?;
        Ok(Self { mean, raw_std })
    }

    /// Number of coefficients
    pub fn dim(&self) -> usize {
        self.mean.elem_count()
    }

    /// Get the device of the parameters.
    pub fn device(&self) -> &Device {
        self.mean.device()
    }

    /// Get the dtype of the parameters.
    pub fn dtype(&self) -> DType {
        self.mean.dtype()
    }
}

impl VariationalDistribution for GaussianVar {
    fn mean(&self) -> Result<Tensor> {
        Ok(self.mean.clone())
    }

    fn std(&self) -> Result<Tensor> {
        softplus(&self.raw_std)
    }
}
