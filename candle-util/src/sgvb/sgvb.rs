use candle_core::{Result, Tensor};

use super::traits::{Likelihood, SgvbModel};

fn elbo_samples<M, L>(model: &M, likelihood: &L, eps: &Tensor) -> Result<Tensor>
where
    M: SgvbModel,
    L: Likelihood,
{
    let sample = model.sample(eps)?;
    let llik = likelihood.log_likelihood(&sample.theta)?;
    // ELBO = log_lik + log_prior - log_q
    (&llik + &sample.log_prior)? - &sample.log_q
}

/// Compute direct ELBO loss with reparameterization gradients.
///
/// Computes -ELBO and lets gradients flow through the samples θ,
/// the prior, the variational density and the likelihood.
///
/// # Arguments
/// * `model` - SGVB model that provides samples and log probabilities
/// * `likelihood` - Differentiable likelihood p(y|θ)
/// * `eps` - Standard normal noise, shape (S, p)
///
/// # Returns
/// Negative ELBO (scalar) - minimize this to maximize ELBO
pub fn direct_elbo_loss<M, L>(model: &M, likelihood: &L, eps: &Tensor) -> Result<Tensor>
where
    M: SgvbModel,
    L: Likelihood,
{
    elbo_samples(model, likelihood, eps)?.mean(0)?.neg()
}

/// Compute the raw ELBO (for monitoring, not for gradients).
///
/// # Returns
/// Mean ELBO estimate over samples (scalar)
pub fn compute_elbo<M, L>(model: &M, likelihood: &L, eps: &Tensor) -> Result<Tensor>
where
    M: SgvbModel,
    L: Likelihood,
{
    Ok(elbo_samples(model, likelihood, eps)?.mean(0)?.detach())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_random::randn_tensor;
    use crate::sgvb::{FixedGaussianPrior, GaussianVar, LatentModelSGVB, VariationalDistribution};
    use candle_core::{DType, Device, D};
    use candle_nn::{Optimizer, VarBuilder, VarMap};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// y_i ~ N(θ, 1) for a scalar θ
    struct MeanLikelihood {
        y: Tensor,
    }

    impl Likelihood for MeanLikelihood {
        fn log_likelihood(&self, theta: &Tensor) -> Result<Tensor> {
            // theta: (S, 1), y: (n,)
            let diff = self.y.unsqueeze(0)?.broadcast_sub(theta)?;
            (diff.sqr()? * (-0.5))?.sum(D::Minus1)
        }
    }

    #[test]
    fn test_elbo_is_scalar() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let var = GaussianVar::new(vb.pp("theta"), 1, 0.0, 0.0)?;
        let prior = FixedGaussianPrior::new(
            Tensor::zeros(1, DType::F32, &dev)?,
            Tensor::ones(1, DType::F32, &dev)?,
        )?;
        let model = LatentModelSGVB::new(var, prior)?;
        let lik = MeanLikelihood {
            y: Tensor::new(&[1.0f32, 2.0], &dev)?,
        };

        let eps = randn_tensor((16, 1), &mut StdRng::seed_from_u64(0), DType::F32, &dev)?;
        assert!(direct_elbo_loss(&model, &lik, &eps)?.dims().is_empty());
        assert!(compute_elbo(&model, &lik, &eps)?.dims().is_empty());
        Ok(())
    }

    #[test]
    fn test_sgvb_recovers_conjugate_posterior() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let mut rng = StdRng::seed_from_u64(42);

        let var = GaussianVar::new(vb.pp("theta"), 1, 0.0, 0.0)?;
        let prior = FixedGaussianPrior::new(
            Tensor::zeros(1, DType::F32, &dev)?,
            Tensor::ones(1, DType::F32, &dev)?,
        )?;
        let model = LatentModelSGVB::new(var, prior)?;

        // prior N(0,1), 4 observations with mean 2.5 -> posterior N(2, 1/5)
        let lik = MeanLikelihood {
            y: Tensor::new(&[2.0f32, 3.0, 2.0, 3.0], &dev)?,
        };

        let mut optimizer = candle_nn::AdamW::new(
            varmap.all_vars(),
            candle_nn::ParamsAdamW {
                lr: 0.05,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        for _ in 0..1000 {
            let eps = randn_tensor((32, 1), &mut rng, DType::F32, &dev)?;
            let loss = direct_elbo_loss(&model, &lik, &eps)?;
            optimizer.backward_step(&loss)?;
        }

        let mean = model.coef_mean()?.to_vec1::<f32>()?[0];
        let sd = model.variational.std()?.to_vec1::<f32>()?[0];
        approx::assert_abs_diff_eq!(mean, 2.0, epsilon = 0.1);
        approx::assert_abs_diff_eq!(sd, 0.2f32.sqrt(), epsilon = 0.1);
        Ok(())
    }
}
