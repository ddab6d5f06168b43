//! Stochastic Gradient Variational Bayes (SGVB) module.
//!
//! Reparameterized ("pathwise") ELBO estimation for a small vector of
//! latent coefficients θ:
//!
//! - θ = μ + σ ⊙ ε with ε ~ N(0, I) drawn from a seeded RNG
//! - ELBO ≈ mean_s [log p(y | θ_s) + log p(θ_s) - log q(θ_s)]
//! - the likelihood is differentiable, so gradients flow through θ
//!
//! # Example
//!
//! ```ignore
//! use candle_util::sgvb::{direct_elbo_loss, FixedGaussianPrior, GaussianVar, LatentModelSGVB};
//!
//! let var = GaussianVar::new(vb.pp("w1"), 2, 0.0, -5.0)?;
//! let prior = FixedGaussianPrior::new(prior_mean, prior_sd)?;
//! let model = LatentModelSGVB::new(var, prior)?;
//!
//! for _ in 0..num_iters {
//!     let eps = randn_tensor((num_samples, 2), &mut rng, dtype, &device)?;
//!     let loss = direct_elbo_loss(&model, &likelihood, &eps)?;
//!     optimizer.backward_step(&loss)?;
//! }
//! ```

mod gaussian_prior;
mod latent_model;
mod sgvb;
mod traits;
mod variational_gaussian;

pub use gaussian_prior::FixedGaussianPrior;
pub use latent_model::LatentModelSGVB;
pub use sgvb::{compute_elbo, direct_elbo_loss};
pub use traits::{Likelihood, Prior, SgvbModel, SgvbSample, VariationalDistribution};
pub use variational_gaussian::GaussianVar;
