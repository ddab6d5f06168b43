//! Small differentiable linear algebra on batched tensors.
//!
//! Candle has no matrix inverse or triangular solve, so these are
//! written with `narrow`/broadcast ops only. Gradients flow through
//! every routine. They are meant for small `p` (a handful of
//! coefficients), not for large dense systems.

use candle_core::{bail, DType, Device, Result, Tensor, D};

/// Numerically stable softplus
///
/// softplus(x) = max(x, 0) + log(1 + exp(-|x|))
///
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    x.relu()?.add(&tail)
}

/// Inverse of softplus for a scalar: log(exp(y) - 1)
pub fn inverse_softplus(y: f64) -> f64 {
    if y > 20.0 {
        y + (-(-y).exp()).ln_1p()
    } else {
        y.exp_m1().ln()
    }
}

/// One-hot vector `e_k` of length `p`
pub fn unit_vector(p: usize, k: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    let mut v = vec![0f32; p];
    v[k] = 1.0;
    Tensor::from_vec(v, p, device)?.to_dtype(dtype)
}

/// Lower-triangular 0/1 mask (diagonal included)
pub fn tril_mask(p: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    let v: Vec<f32> = (0..p)
        .flat_map(|i| (0..p).map(move |j| if j <= i { 1.0 } else { 0.0 }))
        .collect();
    Tensor::from_vec(v, (p, p), device)?.to_dtype(dtype)
}

/// Diagonal matrix from a vector `(p,)` -> `(p, p)`
pub fn diag_embed(v: &Tensor) -> Result<Tensor> {
    let p = v.dim(0)?;
    let eye = Tensor::eye(p, v.dtype(), v.device())?;
    eye.broadcast_mul(&v.unsqueeze(0)?)
}

/// Diagonal of a batch of square matrices `(B, p, p)` -> `(B, p)`
pub fn batch_diag(a: &Tensor) -> Result<Tensor> {
    let p = a.dim(D::Minus1)?;
    let eye = Tensor::eye(p, a.dtype(), a.device())?;
    a.broadcast_mul(&eye)?.sum(D::Minus1)
}

/// Inverse of a batch of symmetric positive definite matrices
///
/// Gauss-Jordan elimination on the augmented system `[A | I]`
/// without pivoting. At step `k` every row is reduced by the
/// normalized pivot row, then the pivot row itself is put back.
///
/// * `a` - `(B, p, p)` or `(p, p)`
///
pub fn batch_inverse(a: &Tensor) -> Result<Tensor> {
    if a.rank() == 2 {
        return batch_inverse(&a.unsqueeze(0)?)?.squeeze(0);
    }

    let (nb, p, q) = a.dims3()?;
    if p != q {
        bail!("batch_inverse: expected square matrices, got {} x {}", p, q);
    }

    let (dtype, device) = (a.dtype(), a.device());
    let eye = Tensor::eye(p, dtype, device)?
        .unsqueeze(0)?
        .broadcast_as((nb, p, p))?
        .contiguous()?;

    let mut aug = Tensor::cat(&[&a.contiguous()?, &eye], 2)?;

    for k in 0..p {
        let pivot_row = aug.narrow(1, k, 1)?;
        let pivot = pivot_row.narrow(2, k, 1)?;
        let pivot_row = pivot_row.broadcast_div(&pivot)?;
        let col_k = aug.narrow(2, k, 1)?;
        let e_k = unit_vector(p, k, dtype, device)?.reshape((1, p, 1))?;

        aug = aug
            .sub(&col_k.broadcast_mul(&pivot_row)?)?
            .add(&e_k.broadcast_mul(&pivot_row)?)?;
    }

    aug.narrow(2, p, p)?.contiguous()
}

/// Solve `L z = r` for a batch of lower-triangular `L` by forward
/// substitution.
///
/// * `l` - `(B, p, p)` lower-triangular with non-zero diagonal
/// * `r` - `(..., B, p)`; leading dimensions broadcast
///
/// Returns `z` with the shape of `r`.
pub fn tril_solve(l: &Tensor, r: &Tensor) -> Result<Tensor> {
    let (nb, p, _) = l.dims3()?;
    if r.rank() < 2 || r.dim(D::Minus1)? != p || r.dim(r.rank() - 2)? != nb {
        bail!(
            "tril_solve: rhs {:?} does not match triangular batch {:?}",
            r.dims(),
            l.dims()
        );
    }
    let last = r.rank() - 1;

    let entry = |i: usize, j: usize| -> Result<Tensor> {
        // (B, 1), right-aligned against (..., B, 1)
        l.narrow(1, i, 1)?.narrow(2, j, 1)?.squeeze(2)
    };

    let mut z: Vec<Tensor> = Vec::with_capacity(p);
    for i in 0..p {
        let mut acc = r.narrow(last, i, 1)?;
        for (j, z_j) in z.iter().enumerate() {
            acc = acc.sub(&z_j.broadcast_mul(&entry(i, j)?)?)?;
        }
        z.push(acc.broadcast_div(&entry(i, i)?)?);
    }
    Tensor::cat(&z, last)
}

/// log |det L| of a batch of triangular matrices `(B, p, p)` -> `(B,)`
pub fn tril_log_abs_det(l: &Tensor) -> Result<Tensor> {
    batch_diag(l)?.abs()?.log()?.sum(D::Minus1)
}
