use candle_core::{bail, Result, Tensor, D};

use crate::candle_loss_functions::gaussian_log_density;

use super::traits::Prior;

/// Fixed (non-learnable) Gaussian prior p(θ) = N(m, diag(τ²))
///
/// Each coordinate carries its own mean and scale.
pub struct FixedGaussianPrior {
    /// Prior mean m: shape (p,)
    mean: Tensor,
    /// Prior scale τ: shape (p,)
    sd: Tensor,
}

impl FixedGaussianPrior {
    /// Create a new fixed Gaussian prior.
    ///
    /// # Arguments
    /// * `mean` - Prior mean, shape (p,)
    /// * `sd` - Prior scale τ, shape (p,), strictly positive
    pub fn new(mean: Tensor, sd: Tensor) -> Result<Self> {
        if mean.dims() != sd.dims() {
            bail!("prior mean {:?} and sd {:?} differ in shape", mean.dims(), sd.dims());
        }
        let min_sd = sd.min_all()?.to_dtype(candle_core::DType::F32)?.to_scalar::<f32>()?;
        if min_sd <= 0.0 {
            bail!("prior scale must be positive, got {}", min_sd);
        }
        Ok(Self { mean, sd })
    }

    /// Get the prior scale τ.
    pub fn sd(&self) -> &Tensor {
        &self.sd
    }

    /// Get the prior mean m.
    pub fn mean(&self) -> &Tensor {
        &self.mean
    }
}

impl Prior for FixedGaussianPrior {
    /// log p(θ) = Σ_j log N(θ_j; m_j, τ_j²)
    fn log_prob(&self, theta: &Tensor) -> Result<Tensor> {
        gaussian_log_density(theta, &self.mean, &self.sd)?.sum(D::Minus1)
    }
}
