use crate::common::*;

/// Candidate experimental designs for an A/B test with a random
/// intercept per participant.
#[derive(Debug, Clone)]
pub struct CandidateDesigns {
    /// One `(n, groups + n)` matrix per candidate design
    pub designs: Vec<Mat>,
    /// `(n, n)` assignment of participants to sigmoid slopes
    pub slope_design: Mat,
    /// Number of treatment-group columns leading each design
    pub num_groups: usize,
}

/// 0/1 assignment matrix of `Σ counts` units to `counts.len()` groups.
///
/// The first `counts[0]` rows go to group 0, the next `counts[1]`
/// rows to group 1, and so on.
pub fn group_assignment_matrix(counts: &[usize]) -> Mat {
    let n: usize = counts.iter().sum();
    let mut x = Mat::zeros(n, counts.len());
    let mut row = 0;
    for (g, &c) in counts.iter().enumerate() {
        for i in row..(row + c) {
            x[(i, g)] = 1.0;
        }
        row += c;
    }
    x
}

/// Random-effect group assignments for `n` participants.
///
/// Participants come in two halves. Design `i` (for `i = 0..=n/2`)
/// puts `i` participants of the first half and `n/2 - i` of the
/// second half in group 0, the rest in group 1, then appends one
/// indicator column per participant.
pub fn rf_group_assignments(n: usize) -> anyhow::Result<CandidateDesigns> {
    if n == 0 || n % 2 != 0 {
        anyhow::bail!("number of participants must be a positive even number, got {}", n);
    }

    let half = n / 2;
    let participants = Mat::identity(n, n);

    let designs = (0..=half)
        .map(|i| {
            let x1 = group_assignment_matrix(&[i, half - i]);
            let x2 = group_assignment_matrix(&[half - i, i]);
            let mut x = Mat::zeros(n, 2 + n);
            x.view_mut((0, 0), (half, 2)).copy_from(&x1);
            x.view_mut((half, 0), (half, 2)).copy_from(&x2);
            x.view_mut((0, 2), (n, n)).copy_from(&participants);
            x
        })
        .collect::<Vec<_>>();

    Ok(CandidateDesigns {
        designs,
        slope_design: participants,
        num_groups: 2,
    })
}

impl CandidateDesigns {
    pub fn num_designs(&self) -> usize {
        self.designs.len()
    }

    pub fn num_participants(&self) -> usize {
        self.slope_design.nrows()
    }

    /// Total number of coefficients (groups + random intercepts)
    pub fn num_columns(&self) -> usize {
        self.designs.first().map(|x| x.ncols()).unwrap_or(0)
    }

    /// All designs stacked as `(D, n, p)`
    pub fn to_tensor(&self, device: &Device) -> anyhow::Result<Tensor> {
        mats_to_tensor(&self.designs, device)
    }

    /// A single design `(n, p)`
    pub fn design_tensor(&self, index: usize, device: &Device) -> anyhow::Result<Tensor> {
        let x = self.designs.get(index).ok_or_else(|| {
            anyhow::anyhow!("design index {} out of range ({})", index, self.num_designs())
        })?;
        mat_to_tensor(x, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_assignment_matrix() {
        let x = group_assignment_matrix(&[2, 1]);
        assert_eq!(x.shape(), (3, 2));
        assert_eq!(x.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0]);
        assert_eq!(x.row(1).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0]);
        assert_eq!(x.row(2).iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0]);

        let empty_group = group_assignment_matrix(&[0, 3]);
        assert_eq!(empty_group.column(0).sum(), 0.0);
        assert_eq!(empty_group.column(1).sum(), 3.0);
    }

    #[test]
    fn test_rf_group_assignments_shapes() -> anyhow::Result<()> {
        let cand = rf_group_assignments(10)?;
        assert_eq!(cand.num_designs(), 6);
        assert_eq!(cand.num_participants(), 10);
        assert_eq!(cand.num_columns(), 12);
        assert_eq!(cand.slope_design, Mat::identity(10, 10));

        for (i, x) in cand.designs.iter().enumerate() {
            // every participant is in exactly one group and has one intercept
            for r in 0..10 {
                assert_eq!(x.row(r).sum(), 2.0);
            }
            // first half: i in group 0; second half: 5 - i in group 0
            let g0_first: f32 = x.view((0, 0), (5, 1)).sum();
            let g0_second: f32 = x.view((5, 0), (5, 1)).sum();
            assert_eq!(g0_first as usize, i);
            assert_eq!(g0_second as usize, 5 - i);
            // groups are balanced overall
            assert_eq!(x.column(0).sum(), 5.0);
            assert_eq!(x.column(1).sum(), 5.0);
        }
        Ok(())
    }

    #[test]
    fn test_rf_group_assignments_tensor() -> anyhow::Result<()> {
        let cand = rf_group_assignments(4)?;
        let t = cand.to_tensor(&Device::Cpu)?;
        assert_eq!(t.dims(), &[3, 4, 6]);

        let x0 = tensor_to_vec2(&cand.design_tensor(0, &Device::Cpu)?)?;
        assert_eq!(x0[0], vec![0., 1., 1., 0., 0., 0.]);
        assert_eq!(x0[2], vec![1., 0., 0., 0., 1., 0.]);
        assert!(cand.design_tensor(3, &Device::Cpu).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_odd_participants() {
        assert!(rf_group_assignments(7).is_err());
        assert!(rf_group_assignments(0).is_err());
    }
}
