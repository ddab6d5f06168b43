use crate::common::*;
use crate::model::SigmoidModel;

use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use candle_util::candle_random::randn_tensor;
use candle_util::sgvb::{
    compute_elbo, direct_elbo_loss, GaussianVar, LatentModelSGVB, Likelihood,
};
use indicatif::{ProgressBar, ProgressDrawTarget};
use rand::Rng;

/// Settings of the stochastic variational posterior update
#[derive(Debug, Clone)]
pub struct SviConfig {
    pub num_steps: usize,
    pub learning_rate: f64,
    /// Monte Carlo particles per ELBO estimate
    pub num_particles: usize,
    pub show_progress: bool,
}

impl Default for SviConfig {
    fn default() -> Self {
        Self {
            num_steps: 10_000,
            learning_rate: 0.005,
            num_particles: 1,
            show_progress: false,
        }
    }
}

/// Mean-field posterior of `w1` fitted by SVI
#[derive(Debug, Clone)]
pub struct SviPosterior {
    pub mean: Vec<f32>,
    pub sd: Vec<f32>,
    /// ELBO estimate every `ELBO_EVERY` steps
    pub elbo_trace: Vec<f32>,
}

const ELBO_EVERY: usize = 100;

/// Initial unconstrained scale; softplus(-5) ≈ 0.0067
const INIT_RAW_SD: f64 = -5.0;

/// Likelihood of one observed outcome with `w2` and `k` fixed to the
/// draws of the current step. The guide uses the prior for both, so
/// their prior and variational terms cancel in the ELBO.
struct ConditionedLikelihood<'a> {
    model: &'a SigmoidModel,
    y: &'a Tensor,
    design: &'a Tensor,
    w2: Tensor,
    k: Tensor,
}

impl Likelihood for ConditionedLikelihood<'_> {
    fn log_likelihood(&self, theta: &Tensor) -> candle_core::Result<Tensor> {
        let w = Tensor::cat(&[theta, &self.w2], 1)?;
        self.model
            .log_likelihood(self.y, self.design, &w, &self.k)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))
    }
}

/// Fit `q(w1) = N(m, softplus(s)²)` to `p(w1 | y, d)` by maximising
/// the reparameterised ELBO, and return the model whose `w1` prior is
/// the fitted posterior.
///
/// * `model` - current model (its `w1` prior is the prior of this update)
/// * `y` - observed outcome `(n,)`
/// * `design` - the design that produced `y`, `(n, p)`
pub fn learn_posterior<R: Rng + ?Sized>(
    model: &SigmoidModel,
    y: &Tensor,
    design: &Tensor,
    config: &SviConfig,
    rng: &mut R,
) -> anyhow::Result<(SigmoidModel, SviPosterior)> {
    if config.num_particles == 0 {
        anyhow::bail!("SVI needs at least one particle");
    }
    let device = y.device();
    let p = model.num_w1();
    let s = config.num_particles;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DEFAULT_DTYPE, device);
    let variational = GaussianVar::new(vb.pp("w1"), p, 0.0, INIT_RAW_SD)?;
    let sgvb = LatentModelSGVB::new(variational, model.w1_prior(device)?)?;

    let mut adam = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        },
    )?;

    let pb = ProgressBar::new(config.num_steps as u64);
    if !config.show_progress {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut elbo_trace = vec![];

    for step in 0..config.num_steps {
        let likelihood = ConditionedLikelihood {
            model,
            y,
            design,
            w2: model.sample_w2(&[s], rng, device)?,
            k: model.sample_k(&[s], rng, device)?,
        };
        let eps = randn_tensor((s, p), rng, DEFAULT_DTYPE, device)?;
        let loss = direct_elbo_loss(&sgvb, &likelihood, &eps)?;
        adam.backward_step(&loss)?;

        if step % ELBO_EVERY == 0 || step + 1 == config.num_steps {
            let elbo = compute_elbo(&sgvb, &likelihood, &eps)?.to_scalar::<f32>()?;
            debug!("[SVI {}] ELBO = {:.4}", step, elbo);
            elbo_trace.push(elbo);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mean = tensor_to_vec1(&sgvb.coef_mean()?)?;
    let sd = tensor_to_vec1(&sgvb.coef_std()?)?;
    info!("SVI posterior w1: mean {:?}, sd {:?}", mean, sd);

    let updated = model.with_w1_prior(&mean, &sd)?;
    Ok((
        updated,
        SviPosterior {
            mean,
            sd,
            elbo_trace,
        },
    ))
}
