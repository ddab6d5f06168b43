use crate::common::*;
use candle_util::candle_loss_functions::{clamped_logit, gaussian_entropy, gaussian_log_density};
use candle_util::candle_random::{gamma_tensor, randn_tensor};
use candle_util::sgvb::FixedGaussianPrior;
use rand::Rng;

/// Parameters of the sigmoid random-effects model
pub struct SigmoidModelParams {
    /// Prior mean of the treatment-group coefficients `w1`
    pub w1_mean: Vec<f32>,
    /// Prior scale of `w1`
    pub w1_sd: Vec<f32>,
    /// Prior mean of the participant intercepts `w2`
    pub w2_mean: Vec<f32>,
    /// Prior scale of `w2`
    pub w2_sd: Vec<f32>,
    /// Noise scale of the linear predictor
    pub obs_sd: f32,
    /// Gamma shape of each sigmoid slope
    pub k_alpha: Vec<f32>,
    /// Gamma rate of each sigmoid slope
    pub k_beta: Vec<f32>,
    /// `(n, num_slopes)` assignment of slopes to participants
    pub slope_design: Mat,
}

/// Bayesian linear model observed through a scaled sigmoid
///
/// ```text
/// w1 ~ N(m1, diag(s1²)),  w2 ~ N(m2, diag(s2²))
/// k  ~ Gamma(α, β)        (per slope, β is a rate)
/// y  = sigmoid(Sk ⊙ (X [w1; w2] + ε)),  ε ~ N(0, σ²)
/// ```
#[derive(Debug, Clone)]
pub struct SigmoidModel {
    w1_mean: Vec<f32>,
    w1_sd: Vec<f32>,
    w2_mean: Vec<f32>,
    w2_sd: Vec<f32>,
    obs_sd: f32,
    k_alpha: Vec<f32>,
    k_beta: Vec<f32>,
    slope_design: Mat,
}

/// Joint draws from the model for a batch of designs
pub struct JointSample {
    /// `(S, D, p1)`
    pub w1: Tensor,
    /// `(S, D, p2)`
    pub w2: Tensor,
    /// `(S, D, num_slopes)`
    pub k: Tensor,
    /// `(S, D, n)`
    pub y: Tensor,
}

fn all_positive(xx: &[f32]) -> bool {
    xx.iter().all(|&x| x > 0.0 && x.is_finite())
}

impl SigmoidModel {
    pub fn new(params: SigmoidModelParams) -> anyhow::Result<Self> {
        let SigmoidModelParams {
            w1_mean,
            w1_sd,
            w2_mean,
            w2_sd,
            obs_sd,
            k_alpha,
            k_beta,
            slope_design,
        } = params;

        if w1_mean.len() != w1_sd.len() || w1_mean.is_empty() {
            anyhow::bail!("w1 mean ({}) and sd ({}) must have the same positive length",
                          w1_mean.len(), w1_sd.len());
        }
        if w2_mean.len() != w2_sd.len() {
            anyhow::bail!("w2 mean ({}) and sd ({}) differ in length", w2_mean.len(), w2_sd.len());
        }
        if !all_positive(&w1_sd) || !all_positive(&w2_sd) || !(obs_sd > 0.0) {
            anyhow::bail!("prior and noise scales must be positive");
        }
        if k_alpha.len() != k_beta.len() || k_alpha.len() != slope_design.ncols() {
            anyhow::bail!(
                "slope design has {} columns, but {} shapes and {} rates",
                slope_design.ncols(),
                k_alpha.len(),
                k_beta.len()
            );
        }
        if !all_positive(&k_alpha) || !all_positive(&k_beta) {
            anyhow::bail!("Gamma shape and rate must be positive");
        }

        Ok(Self {
            w1_mean,
            w1_sd,
            w2_mean,
            w2_sd,
            obs_sd,
            k_alpha,
            k_beta,
            slope_design,
        })
    }

    /// The initial prior of the sequential experiment for `n`
    /// participants: `w1 ~ N(0, [10, 2.5])`, the first half of the
    /// intercepts with scale 1 and the second half with scale 10,
    /// `σ = 1` and slopes `k ~ Gamma(100, 1000)`.
    pub fn prior_default(slope_design: Mat) -> anyhow::Result<Self> {
        let n = slope_design.nrows();
        let half = n / 2;
        let w2_sd = (0..n)
            .map(|i| if i < half { 1.0 } else { 10.0 })
            .collect::<Vec<f32>>();
        let num_slopes = slope_design.ncols();

        Self::new(SigmoidModelParams {
            w1_mean: vec![0.0, 0.0],
            w1_sd: vec![10.0, 2.5],
            w2_mean: vec![0.0; n],
            w2_sd,
            obs_sd: 1.0,
            k_alpha: vec![100.0; num_slopes],
            k_beta: vec![1000.0; num_slopes],
            slope_design,
        })
    }

    /// Same model with the prior on `w1` replaced by `N(mean, diag(sd²))`
    pub fn with_w1_prior(&self, mean: &[f32], sd: &[f32]) -> anyhow::Result<Self> {
        if mean.len() != self.w1_mean.len() || sd.len() != self.w1_sd.len() {
            anyhow::bail!("w1 has {} coefficients", self.w1_mean.len());
        }
        if !all_positive(sd) || mean.iter().any(|m| !m.is_finite()) {
            anyhow::bail!("invalid w1 posterior: mean {:?}, sd {:?}", mean, sd);
        }
        let mut ret = self.clone();
        ret.w1_mean = mean.to_vec();
        ret.w1_sd = sd.to_vec();
        Ok(ret)
    }

    pub fn num_w1(&self) -> usize {
        self.w1_mean.len()
    }

    pub fn num_w2(&self) -> usize {
        self.w2_mean.len()
    }

    pub fn num_participants(&self) -> usize {
        self.slope_design.nrows()
    }

    pub fn w1_mean(&self) -> &[f32] {
        &self.w1_mean
    }

    pub fn w1_sd(&self) -> &[f32] {
        &self.w1_sd
    }

    /// Entropy of the `w1` prior
    pub fn w1_entropy(&self) -> f32 {
        gaussian_entropy(&self.w1_sd)
    }

    /// The `w1` prior as an SGVB prior
    pub fn w1_prior(&self, device: &Device) -> anyhow::Result<FixedGaussianPrior> {
        let p = self.num_w1();
        Ok(FixedGaussianPrior::new(
            Tensor::from_slice(&self.w1_mean, p, device)?,
            Tensor::from_slice(&self.w1_sd, p, device)?,
        )?)
    }

    fn draw_gaussian<R: Rng + ?Sized>(
        mean: &[f32],
        sd: &[f32],
        batch: &[usize],
        rng: &mut R,
        device: &Device,
    ) -> anyhow::Result<Tensor> {
        let p = mean.len();
        let mut dims = batch.to_vec();
        dims.push(p);
        let eps = randn_tensor(dims, rng, DEFAULT_DTYPE, device)?;
        let m = Tensor::from_slice(mean, p, device)?;
        let s = Tensor::from_slice(sd, p, device)?;
        Ok(eps.broadcast_mul(&s)?.broadcast_add(&m)?)
    }

    /// Draw `w2` from its prior, shape `(batch..., p2)`
    pub fn sample_w2<R: Rng + ?Sized>(
        &self,
        batch: &[usize],
        rng: &mut R,
        device: &Device,
    ) -> anyhow::Result<Tensor> {
        Self::draw_gaussian(&self.w2_mean, &self.w2_sd, batch, rng, device)
    }

    /// Draw slopes `k` from their prior, shape `(batch..., num_slopes)`
    pub fn sample_k<R: Rng + ?Sized>(
        &self,
        batch: &[usize],
        rng: &mut R,
        device: &Device,
    ) -> anyhow::Result<Tensor> {
        Ok(gamma_tensor(batch, &self.k_alpha, &self.k_beta, rng, DEFAULT_DTYPE, device)?)
    }

    /// Per-participant slopes `S k`: `(..., num_slopes)` -> `(..., n)`
    fn assign_slopes(&self, k: &Tensor) -> anyhow::Result<Tensor> {
        let s = mat_to_tensor(&self.slope_design, k.device())?;
        let k_rank = k.rank();
        Ok(k.unsqueeze(k_rank - 1)?.broadcast_mul(&s)?.sum(D::Minus1)?)
    }

    /// Linear predictor `X w`: design `(..., n, p)`, `w (..., p)` -> `(..., n)`
    fn linear_predictor(design: &Tensor, w: &Tensor) -> anyhow::Result<Tensor> {
        let w_rank = w.rank();
        Ok(design.broadcast_mul(&w.unsqueeze(w_rank - 1)?)?.sum(D::Minus1)?)
    }

    /// Draw `num_samples` joint samples of `(w1, w2, k, y)` for each of
    /// the `D` designs in `designs (D, n, p)`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        designs: &Tensor,
        num_samples: usize,
        rng: &mut R,
    ) -> anyhow::Result<JointSample> {
        let device = designs.device();
        let (nd, n, p) = designs.dims3()?;
        let num_coef = self.num_w1() + self.num_w2();
        if p != num_coef {
            anyhow::bail!("design has {} columns, model has {} coefficients", p, num_coef);
        }
        if n != self.num_participants() {
            anyhow::bail!(
                "design has {} rows, model has {} participants",
                n,
                self.num_participants()
            );
        }

        let batch = [num_samples, nd];
        let w1 = Self::draw_gaussian(&self.w1_mean, &self.w1_sd, &batch, rng, device)?;
        let w2 = self.sample_w2(&batch, rng, device)?;
        let k = self.sample_k(&batch, rng, device)?;

        let w = Tensor::cat(&[&w1, &w2], 2)?;
        let eta = Self::linear_predictor(&designs.unsqueeze(0)?, &w)?;
        let noise = (randn_tensor((num_samples, nd, n), rng, DEFAULT_DTYPE, device)?
            * self.obs_sd as f64)?;
        let slopes = self.assign_slopes(&k)?;
        let y = candle_nn::ops::sigmoid(&(eta + noise)?.mul(&slopes)?)?;

        Ok(JointSample { w1, w2, k, y })
    }

    /// log p(y | w, k) for one design
    ///
    /// With `z = logit(y) / k`,
    /// `log p(y) = Σ_i [log N(z_i; (Xw)_i, σ²) - log k_i - log y_i - log(1 - y_i)]`.
    ///
    /// * `y` - observation `(n,)`
    /// * `design` - `(n, p)`
    /// * `w` - full coefficient samples `(S, p)`
    /// * `k` - slope samples `(S, num_slopes)`
    ///
    /// Returns `(S,)`
    pub fn log_likelihood(
        &self,
        y: &Tensor,
        design: &Tensor,
        w: &Tensor,
        k: &Tensor,
    ) -> anyhow::Result<Tensor> {
        let mean = Self::linear_predictor(&design.unsqueeze(0)?, w)?;
        let slopes = self.assign_slopes(k)?;

        let y_lo = y.clamp(LOGIT_FLOOR, 1.0)?;
        let y_hi = y.affine(-1.0, 1.0)?.clamp(LOGIT_FLOOR, 1.0)?;
        let z = clamped_logit(y, LOGIT_FLOOR)?
            .unsqueeze(0)?
            .broadcast_div(&slopes)?;

        let sd = Tensor::new(&[self.obs_sd], y.device())?;
        let log_jacobian = slopes
            .log()?
            .broadcast_add(&y_lo.log()?.add(&y_hi.log()?)?.unsqueeze(0)?)?;

        Ok(gaussian_log_density(&z, &mean, &sd)?
            .sub(&log_jacobian)?
            .sum(D::Minus1)?)
    }
}

/// Fixed data-generating process used to simulate experiment outcomes
#[derive(Debug, Clone)]
pub struct TrueModel {
    pub w1: Vec<f32>,
    pub w2: Vec<f32>,
    pub k: f32,
    pub obs_sd: f32,
}

impl Default for TrueModel {
    fn default() -> Self {
        Self {
            w1: vec![-1.0, 1.0],
            w2: vec![-0.5, 0.5, -0.5, 0.5, -0.5, 2.0, -2.0, 2.0, -2.0, 0.0],
            k: 0.1,
            obs_sd: 1.0,
        }
    }
}

impl TrueModel {
    pub fn num_participants(&self) -> usize {
        self.w2.len()
    }

    /// Simulate `y = sigmoid(k (X w + ε))` for one design `(n, p)`
    pub fn sample<R: Rng + ?Sized>(&self, design: &Tensor, rng: &mut R) -> anyhow::Result<Tensor> {
        let device = design.device();
        let (n, p) = design.dims2()?;
        if p != self.w1.len() + self.w2.len() {
            anyhow::bail!("design has {} columns, truth has {}", p, self.w1.len() + self.w2.len());
        }

        let w: Vec<f32> = self.w1.iter().chain(self.w2.iter()).copied().collect();
        let w = Tensor::from_vec(w, p, device)?;
        let eta = design.broadcast_mul(&w.unsqueeze(0)?)?.sum(1)?;
        let noise = (randn_tensor(n, rng, DEFAULT_DTYPE, device)? * self.obs_sd as f64)?;
        Ok(candle_nn::ops::sigmoid(&((eta + noise)? * self.k as f64)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::designs::rf_group_assignments;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_joint_sample_shapes_and_range() -> anyhow::Result<()> {
        let cand = rf_group_assignments(10)?;
        let model = SigmoidModel::prior_default(cand.slope_design.clone())?;
        let designs = cand.to_tensor(&Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(11);

        let s = model.sample(&designs, 7, &mut rng)?;
        assert_eq!(s.w1.dims(), &[7, 6, 2]);
        assert_eq!(s.w2.dims(), &[7, 6, 10]);
        assert_eq!(s.k.dims(), &[7, 6, 10]);
        assert_eq!(s.y.dims(), &[7, 6, 10]);

        let y = s.y.flatten_all()?.to_vec1::<f32>()?;
        assert!(y.iter().all(|&v| (0.0..=1.0).contains(&v)));
        Ok(())
    }

    #[test]
    fn test_log_likelihood_hand_computed() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let slope_design = Mat::identity(2, 2);
        let model = SigmoidModel::new(SigmoidModelParams {
            w1_mean: vec![0.0],
            w1_sd: vec![1.0],
            w2_mean: vec![],
            w2_sd: vec![],
            obs_sd: 1.0,
            k_alpha: vec![1.0, 1.0],
            k_beta: vec![1.0, 1.0],
            slope_design,
        })?;

        let design = Tensor::new(&[[1.0f32], [0.0]], &dev)?;
        let w = Tensor::new(&[[2.0f32]], &dev)?;
        let k = Tensor::new(&[[0.5f32, 1.0]], &dev)?;
        let y = Tensor::new(&[0.5f32, 0.731_058_6], &dev)?;

        let lp = model.log_likelihood(&y, &design, &w, &k)?.to_vec1::<f32>()?;
        assert_eq!(lp.len(), 1);

        // unit 0: z = 0 / 0.5 = 0, mean 2; unit 1: z = 1 / 1 = 1, mean 0
        let ln_norm = |z: f32, m: f32| -0.5 * (z - m).powi(2) - 0.918_938_5;
        let jac0 = 0.5f32.ln() + 0.5f32.ln() + 0.5f32.ln();
        let jac1 = 1.0f32.ln() + 0.731_058_6f32.ln() + (1.0 - 0.731_058_6f32).ln();
        let expected = ln_norm(0.0, 2.0) - jac0 + ln_norm(1.0, 0.0) - jac1;
        approx::assert_abs_diff_eq!(lp[0], expected, epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn test_with_w1_prior() -> anyhow::Result<()> {
        let cand = rf_group_assignments(10)?;
        let model = SigmoidModel::prior_default(cand.slope_design)?;
        assert_eq!(model.w1_sd(), &[10.0, 2.5]);

        let updated = model.with_w1_prior(&[-0.8, 0.9], &[0.5, 0.4])?;
        assert_eq!(updated.w1_mean(), &[-0.8, 0.9]);
        assert_eq!(updated.num_w2(), 10);
        assert!(updated.w1_entropy() < model.w1_entropy());

        assert!(model.with_w1_prior(&[0.0, 0.0], &[1.0, -1.0]).is_err());
        assert!(model.with_w1_prior(&[0.0], &[1.0]).is_err());
        Ok(())
    }

    #[test]
    fn test_true_model_sample() -> anyhow::Result<()> {
        let cand = rf_group_assignments(10)?;
        let truth = TrueModel::default();
        let mut rng = StdRng::seed_from_u64(5);
        let y = truth.sample(&cand.design_tensor(3, &Device::Cpu)?, &mut rng)?;
        assert_eq!(y.dims(), &[10]);
        let y = tensor_to_vec1(&y)?;
        // k = 0.1 keeps outcomes well inside (0, 1)
        assert!(y.iter().all(|&v| v > 0.1 && v < 0.9));
        Ok(())
    }
}
