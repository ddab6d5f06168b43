use candle_core::{Result, Tensor};

use super::traits::{Prior, SgvbModel, SgvbSample, VariationalDistribution};

/// Generic latent-coefficient SGVB model: θ ~ q(θ), θ ~ p(θ) a priori.
///
/// The likelihood owns the design, so this only pairs a variational
/// distribution with its prior.
/// - V: VariationalDistribution for the coefficients
/// - P: Prior distribution for the coefficients
pub struct LatentModelSGVB<V, P> {
    /// Variational distribution for coefficients θ
    pub variational: V,
    /// Prior distribution p(θ)
    pub prior: P,
    dim: usize,
}

impl<V: VariationalDistribution, P: Prior> LatentModelSGVB<V, P> {
    /// Pair a variational distribution with a prior.
    pub fn new(variational: V, prior: P) -> Result<Self> {
        let dim = variational.mean()?.elem_count();
        Ok(Self {
            variational,
            prior,
            dim,
        })
    }

    /// Get the variational mean of coefficients μ_θ
    pub fn coef_mean(&self) -> Result<Tensor> {
        self.variational.mean()
    }

    /// Get the variational standard deviation of coefficients σ_θ
    pub fn coef_std(&self) -> Result<Tensor> {
        self.variational.std()
    }
}

impl<V: VariationalDistribution, P: Prior> SgvbModel for LatentModelSGVB<V, P> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn sample(&self, eps: &Tensor) -> Result<SgvbSample> {
        let theta = self.variational.sample_with_noise(eps)?;
        let log_prior = self.prior.log_prob(&theta)?;
        let log_q = self.variational.log_prob(&theta)?;
        Ok(SgvbSample {
            theta,
            log_prior,
            log_q,
        })
    }
}
