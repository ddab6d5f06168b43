//! Seeded random tensors.
//!
//! Candle's own `randn` on CPU cannot be seeded, so the noise for
//! simulation and reparameterization is drawn from a `rand` RNG and
//! copied into a tensor.

use candle_core::{DType, Device, Result, Shape, Tensor};
use rand::Rng;
use rand_distr::{Distribution, Gamma, StandardNormal, Uniform};

/// Standard normal noise of the given shape
pub fn randn_tensor<S, R>(shape: S, rng: &mut R, dtype: DType, device: &Device) -> Result<Tensor>
where
    S: Into<Shape>,
    R: Rng + ?Sized,
{
    let shape: Shape = shape.into();
    let v: Vec<f32> = (0..shape.elem_count())
        .map(|_| StandardNormal.sample(rng))
        .collect();
    Tensor::from_vec(v, shape, device)?.to_dtype(dtype)
}

/// Independent Gamma draws with shape `alpha[j]` and rate `beta[j]`
/// along the last axis; leading axes are `batch`.
///
/// Returns a tensor of shape `(batch..., alpha.len())`
pub fn gamma_tensor<R>(
    batch: &[usize],
    alpha: &[f32],
    beta: &[f32],
    rng: &mut R,
    dtype: DType,
    device: &Device,
) -> Result<Tensor>
where
    R: Rng + ?Sized,
{
    if alpha.len() != beta.len() {
        candle_core::bail!(
            "gamma_tensor: {} shapes but {} rates",
            alpha.len(),
            beta.len()
        );
    }

    let dists = alpha
        .iter()
        .zip(beta.iter())
        .map(|(&a, &b)| {
            Gamma::new(a, 1.0 / b).map_err(|e| candle_core::Error::Msg(format!("gamma: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    let nrep: usize = batch.iter().product();
    let mut v = Vec::with_capacity(nrep * dists.len());
    for _ in 0..nrep {
        v.extend(dists.iter().map(|d| d.sample(rng)));
    }

    let mut dims = batch.to_vec();
    dims.push(dists.len());
    Tensor::from_vec(v, dims, device)?.to_dtype(dtype)
}

/// Uniform index in `0..n`
pub fn uniform_index<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<usize> {
    let unif = Uniform::new(0, n).map_err(|e| candle_core::Error::Msg(format!("{}", e)))?;
    Ok(unif.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_randn_is_seeded() -> Result<()> {
        let a = randn_tensor((3, 4), &mut StdRng::seed_from_u64(7), DType::F32, &Device::Cpu)?;
        let b = randn_tensor((3, 4), &mut StdRng::seed_from_u64(7), DType::F32, &Device::Cpu)?;
        assert_eq!(a.dims(), &[3, 4]);
        assert_eq!(a.to_vec2::<f32>()?, b.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_gamma_mean() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(1);
        let k = gamma_tensor(&[2000], &[100.0, 4.0], &[1000.0, 2.0], &mut rng, DType::F32, &Device::Cpu)?;
        assert_eq!(k.dims(), &[2000, 2]);
        let mean = k.mean(0)?.to_vec1::<f32>()?;
        approx::assert_abs_diff_eq!(mean[0], 0.1, epsilon = 0.005);
        approx::assert_abs_diff_eq!(mean[1], 2.0, epsilon = 0.15);
        Ok(())
    }

    #[test]
    fn test_gamma_rejects_mismatch() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(gamma_tensor(&[1], &[1.0], &[], &mut rng, DType::F32, &Device::Cpu).is_err());
    }

    #[test]
    fn test_uniform_index_range() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(uniform_index(6, &mut rng)? < 6);
        }
        Ok(())
    }
}
