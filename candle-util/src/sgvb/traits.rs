use candle_core::{Result, Tensor, D};

use crate::candle_loss_functions::gaussian_log_density;

/// Differentiable likelihood of the observed data given latent
/// coefficient samples.
pub trait Likelihood {
    /// Evaluate log p(y | θ)
    ///
    /// # Arguments
    /// * `theta` - Coefficient samples, shape (S, p)
    ///
    /// # Returns
    /// Log-likelihood values, shape (S,)
    fn log_likelihood(&self, theta: &Tensor) -> Result<Tensor>;
}

/// Diagonal Gaussian variational distribution with pathwise sampling.
pub trait VariationalDistribution {
    /// Variational mean μ, shape (p,)
    fn mean(&self) -> Result<Tensor>;

    /// Variational standard deviation σ, shape (p,)
    fn std(&self) -> Result<Tensor>;

    /// θ = μ + σ ⊙ ε
    ///
    /// # Arguments
    /// * `eps` - Standard normal noise, shape (S, p)
    fn sample_with_noise(&self, eps: &Tensor) -> Result<Tensor> {
        eps.broadcast_mul(&self.std()?)?
            .broadcast_add(&self.mean()?)
    }

    /// log q(θ), summed over the last dimension
    fn log_prob(&self, theta: &Tensor) -> Result<Tensor> {
        gaussian_log_density(theta, &self.mean()?, &self.std()?)?.sum(D::Minus1)
    }
}

/// Prior distribution trait.
pub trait Prior {
    /// Compute log p(θ) under the prior.
    ///
    /// # Arguments
    /// * `theta` - Parameter samples, shape (S, p)
    ///
    /// # Returns
    /// Log prior probability, shape (S,) summed over parameter dimensions
    fn log_prob(&self, theta: &Tensor) -> Result<Tensor>;
}

/// Output of one pathwise draw from an SGVB model.
pub struct SgvbSample {
    /// Samples θ, shape (S, p), differentiable w.r.t. the variational parameters
    pub theta: Tensor,
    /// log p(θ), shape (S,)
    pub log_prior: Tensor,
    /// log q(θ), shape (S,)
    pub log_q: Tensor,
}

/// Model that can produce reparameterized samples with their prior
/// and variational log densities.
pub trait SgvbModel {
    /// Number of latent coefficients p
    fn dim(&self) -> usize;

    /// Draw samples from the variational distribution given noise ε of shape (S, p)
    fn sample(&self, eps: &Tensor) -> Result<SgvbSample>;
}
