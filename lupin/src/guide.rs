use crate::common::*;
use candle_nn::VarBuilder;
use candle_util::candle_linalg::{
    batch_inverse, diag_embed, inverse_softplus, softplus, tril_mask,
};
use candle_util::candle_loss_functions::{clamped_logit, mvn_tril_log_density};

/// Logits of the observations are divided by this before the
/// learned per-participant rescaling
const LOGIT_TEMPERATURE: f64 = 0.1;

/// Amortized posterior q(w1 | y, d) for the sigmoid model.
///
/// The observation is pulled back to the linear scale with a learned
/// monotone-ish transform, then `w1` is estimated by ridge regression
/// on the treatment-group columns of the design:
///
/// ```text
/// t  = logit(y) / 0.1 ⊙ a
/// t  = t + softplus(t) ⊙ b + c
/// μ  = (XᵀX + diag(softplus(r)))⁻¹ Xᵀ t
/// q  = N(μ, L_d L_dᵀ)      one learned lower-triangular L_d per design
/// ```
pub struct SigmoidPosteriorGuide {
    inverse_sigmoid_scale: Tensor,
    h1_weight: Tensor,
    h1_bias: Tensor,
    regu: Tensor,
    regu_offset: Tensor,
    scale_tril: Tensor,
    scale_tril_offset: Tensor,
    mask: Tensor,
    num_coef: usize,
    num_designs: usize,
}

/// Posterior of `w1` read off the guide
#[derive(Debug, Clone)]
pub struct GuidePosterior {
    /// `(p,)`
    pub mean: Vec<f32>,
    /// `(p, p)` lower-triangular
    pub scale_tril: Vec<Vec<f32>>,
}

impl SigmoidPosteriorGuide {
    /// Build the guide and register its parameters in `vb`.
    ///
    /// * `prior_sd` - prior scale of `w1`; the ridge penalty starts at
    ///   the prior precision and every `L_d` starts at `diag(prior_sd)`
    /// * `num_designs` - number of candidate designs `D`
    /// * `num_participants` - number of observations per experiment `n`
    pub fn new(
        vb: VarBuilder,
        prior_sd: &[f32],
        num_designs: usize,
        num_participants: usize,
    ) -> anyhow::Result<Self> {
        let p = prior_sd.len();
        let n = num_participants;
        if p == 0 || num_designs == 0 || n == 0 {
            anyhow::bail!("empty guide: p = {}, D = {}, n = {}", p, num_designs, n);
        }
        if prior_sd.iter().any(|&s| !(s > 0.0)) {
            anyhow::bail!("prior scales must be positive: {:?}", prior_sd);
        }
        let device = vb.device().clone();
        let dtype = vb.dtype();

        let inverse_sigmoid_scale =
            vb.get_with_hints(n, "inverse_sigmoid_scale", candle_nn::Init::Const(1.0))?;
        let h1_weight = vb.get_with_hints(n, "h1_weight", candle_nn::Init::Const(1.0))?;
        let h1_bias = vb.get_with_hints(n, "h1_bias", candle_nn::Init::Const(0.0))?;
        let regu = vb.get_with_hints(p, "regu", candle_nn::Init::Const(0.0))?;
        let scale_tril = vb.get_with_hints(
            (num_designs, p, p),
            "scale_tril",
            candle_nn::Init::Const(0.0),
        )?;

        let precision: Vec<f32> = prior_sd
            .iter()
            .map(|&s| inverse_softplus(1.0 / (s as f64).powi(2)) as f32)
            .collect();
        let regu_offset = Tensor::from_vec(precision, p, &device)?.to_dtype(dtype)?;

        let sd = Tensor::from_slice(prior_sd, p, &device)?.to_dtype(dtype)?;
        let scale_tril_offset = diag_embed(&sd)?
            .unsqueeze(0)?
            .broadcast_as((num_designs, p, p))?
            .contiguous()?;

        let mask = tril_mask(p, dtype, &device)?;

        Ok(Self {
            inverse_sigmoid_scale,
            h1_weight,
            h1_bias,
            regu,
            regu_offset,
            scale_tril,
            scale_tril_offset,
            mask,
            num_coef: p,
            num_designs,
        })
    }

    pub fn num_coef(&self) -> usize {
        self.num_coef
    }

    pub fn num_designs(&self) -> usize {
        self.num_designs
    }

    /// Learned transform of the observations, same shape as `y (..., n)`
    pub fn transform_observation(&self, y: &Tensor) -> anyhow::Result<Tensor> {
        let t = (clamped_logit(y, LOGIT_FLOOR)? / LOGIT_TEMPERATURE)?
            .broadcast_mul(&self.inverse_sigmoid_scale)?;
        let hidden = softplus(&t)?;
        Ok(t
            .add(&hidden.broadcast_mul(&self.h1_weight)?)?
            .broadcast_add(&self.h1_bias)?)
    }

    /// Lower-triangular scale of every design, `(D, p, p)`
    pub fn scale_tril(&self) -> anyhow::Result<Tensor> {
        Ok(self
            .scale_tril
            .add(&self.scale_tril_offset)?
            .broadcast_mul(&self.mask)?)
    }

    /// Posterior mean and scale of `w1`.
    ///
    /// * `y` - observations `(..., D, n)`, or `(n,)` to share one
    ///   observation across all designs
    /// * `designs` - `(D, n, P)`; the first `p` columns are the
    ///   treatment groups
    ///
    /// Returns `(μ (..., D, p), L (D, p, p))`
    pub fn forward(&self, y: &Tensor, designs: &Tensor) -> anyhow::Result<(Tensor, Tensor)> {
        let (nd, _, ncol) = designs.dims3()?;
        if nd != self.num_designs || ncol < self.num_coef {
            anyhow::bail!(
                "guide expects {} designs with at least {} columns, got {:?}",
                self.num_designs,
                self.num_coef,
                designs.dims()
            );
        }

        let t = self.transform_observation(y)?;

        // (D, n, p)
        let x = designs.narrow(2, 0, self.num_coef)?.contiguous()?;
        let xtx = x.transpose(1, 2)?.contiguous()?.matmul(&x)?;
        let tikhonov = diag_embed(&softplus(&self.regu.add(&self.regu_offset)?)?)?;
        let xtx_inv = batch_inverse(&xtx.broadcast_add(&tikhonov)?)?;

        // Xᵀ t: (..., D, n, 1) * (D, n, p) -> (..., D, p)
        let xty = t
            .unsqueeze(t.rank())?
            .broadcast_mul(&x)?
            .sum(D::Minus2)?;

        // (XᵀX + Λ)⁻¹ Xᵀ t: (..., D, 1, p) * (D, p, p) -> (..., D, p)
        let mu = xty
            .unsqueeze(xty.rank() - 1)?
            .broadcast_mul(&xtx_inv)?
            .sum(D::Minus1)?;

        Ok((mu, self.scale_tril()?))
    }

    /// log q(w1 | y, d) for samples `w1 (..., D, p)` and `y (..., D, n)`.
    ///
    /// Returns `(..., D)`
    pub fn log_prob(&self, w1: &Tensor, y: &Tensor, designs: &Tensor) -> anyhow::Result<Tensor> {
        let (mu, scale_tril) = self.forward(y, designs)?;
        Ok(mvn_tril_log_density(w1, &mu, &scale_tril)?)
    }

    /// Posterior of `w1` at design `index` after observing `y (n,)`
    pub fn posterior_at(
        &self,
        y: &Tensor,
        designs: &Tensor,
        index: usize,
    ) -> anyhow::Result<GuidePosterior> {
        if index >= self.num_designs {
            anyhow::bail!("design index {} out of range ({})", index, self.num_designs);
        }
        let (mu, scale_tril) = self.forward(y, designs)?;
        let mean = tensor_to_vec1(&mu.get(index)?.detach())?;
        let scale_tril = tensor_to_vec2(&scale_tril.get(index)?.detach())?;
        Ok(GuidePosterior { mean, scale_tril })
    }
}

impl GuidePosterior {
    /// Marginal scales `|L_jj|`
    pub fn sd(&self) -> Vec<f32> {
        self.scale_tril
            .iter()
            .enumerate()
            .map(|(j, row)| row[j].abs())
            .collect()
    }
}
