//! Fit a two-coefficient Gaussian regression by SGVB and compare with
//! the closed-form posterior.

use candle_core::{DType, Device, Result, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use candle_util::candle_loss_functions::gaussian_log_density;
use candle_util::candle_random::randn_tensor;
use candle_util::sgvb::{
    compute_elbo, direct_elbo_loss, FixedGaussianPrior, GaussianVar, LatentModelSGVB, Likelihood,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

struct UnitNoiseRegression {
    /// (p, n)
    xt: Tensor,
    /// (n,)
    y: Tensor,
    sd: Tensor,
}

impl Likelihood for UnitNoiseRegression {
    fn log_likelihood(&self, theta: &Tensor) -> Result<Tensor> {
        let pred = theta.matmul(&self.xt)?;
        gaussian_log_density(&self.y, &pred, &self.sd)?.sum(D::Minus1)
    }
}

#[test]
fn orthogonal_design_recovers_closed_form_posterior() -> Result<()> {
    let dev = Device::Cpu;

    // rows [1,0],[1,0],[0,1],[0,1]
    let xt = Tensor::new(&[[1.0f32, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 1.0]], &dev)?;
    let y = Tensor::new(&[1.0f32, 3.0, -2.0, -4.0], &dev)?;
    let lik = UnitNoiseRegression {
        xt,
        y,
        sd: Tensor::new(&[1.0f32], &dev)?,
    };

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
    let q = GaussianVar::new(vb.pp("theta"), 2, 0.0, 0.0)?;
    let prior = FixedGaussianPrior::new(Tensor::zeros(2, DType::F32, &dev)?, Tensor::ones(2, DType::F32, &dev)?)?;
    let model = LatentModelSGVB::new(q, prior)?;

    let mut adam = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: 0.02,
            weight_decay: 0.0,
            ..Default::default()
        },
    )?;

    let mut rng = StdRng::seed_from_u64(11);
    let mut first_elbo = None;
    let mut last_elbo = 0f32;
    for _ in 0..3000 {
        let eps = randn_tensor((16, 2), &mut rng, DType::F32, &dev)?;
        let loss = direct_elbo_loss(&model, &lik, &eps)?;
        adam.backward_step(&loss)?;

        let eps = randn_tensor((256, 2), &mut rng, DType::F32, &dev)?;
        last_elbo = compute_elbo(&model, &lik, &eps)?.to_scalar::<f32>()?;
        first_elbo.get_or_insert(last_elbo);
    }

    // precision 1 + 2 per coefficient, mean Σy / 3
    let mean = model.coef_mean()?.to_vec1::<f32>()?;
    let sd = model.coef_std()?.to_vec1::<f32>()?;
    approx::assert_abs_diff_eq!(mean[0], 4.0 / 3.0, epsilon = 0.1);
    approx::assert_abs_diff_eq!(mean[1], -2.0, epsilon = 0.1);
    for s in sd {
        approx::assert_abs_diff_eq!(s, 1.0 / 3f32.sqrt(), epsilon = 0.08);
    }

    assert!(first_elbo.is_some_and(|e| e < last_elbo));
    Ok(())
}
