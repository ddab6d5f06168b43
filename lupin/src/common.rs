#![allow(dead_code)]

pub use log::{debug, info, warn};

pub use candle_util::{candle_core, candle_nn};
pub use candle_core::{DType, Device, Tensor, D};

pub type Mat = nalgebra::DMatrix<f32>;

pub const DEFAULT_DTYPE: DType = DType::F32;

/// Lower clamp on `y` and `1 - y` before taking logits
pub const LOGIT_FLOOR: f64 = 1e-35;

/// Dense `nalgebra` matrix `(n, p)` -> tensor `(n, p)`
pub fn mat_to_tensor(mat: &Mat, device: &Device) -> anyhow::Result<Tensor> {
    let (n, p) = mat.shape();
    // nalgebra is column-major
    let data: Vec<f32> = mat.transpose().iter().copied().collect();
    Ok(Tensor::from_vec(data, (n, p), device)?)
}

/// Stack matrices of the same shape into `(B, n, p)`
pub fn mats_to_tensor(mats: &[Mat], device: &Device) -> anyhow::Result<Tensor> {
    if mats.is_empty() {
        anyhow::bail!("no matrices to stack");
    }
    let shape = mats[0].shape();
    let rows = mats
        .iter()
        .map(|m| {
            if m.shape() != shape {
                anyhow::bail!("shape mismatch: {:?} vs {:?}", m.shape(), shape);
            }
            mat_to_tensor(m, device)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Tensor::stack(&rows, 0)?)
}

/// Read a rank-1 tensor into a `Vec<f32>`
pub fn tensor_to_vec1(t: &Tensor) -> anyhow::Result<Vec<f32>> {
    Ok(t.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}

/// Read a rank-2 tensor into row vectors
pub fn tensor_to_vec2(t: &Tensor) -> anyhow::Result<Vec<Vec<f32>>> {
    Ok(t.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2::<f32>()?)
}

/// Index of the smallest finite entry
pub fn argmin(xx: &[f32]) -> anyhow::Result<usize> {
    if let Some(bad) = xx.iter().find(|x| !x.is_finite()) {
        anyhow::bail!("non-finite score {} in {:?}", bad, xx);
    }
    xx.iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or_else(|| anyhow::anyhow!("empty score vector"))
}
