//! C4: the log-space forward pass (§4.3).

use bio::stats::LogProb;
use ndarray::Array2;

use crate::core::emission::EmissionModel;
use crate::core::numeric::{is_numerically_unusable, ln, log_sum_exp};
use crate::errors::Error;

/// The log-α matrix, row-major `(site, donor)` for cache locality (spec
/// §9's "giant parameter list" design note calls this out explicitly as
/// the preferred layout over an array-of-arrays).
#[derive(Debug, Clone)]
pub struct AlphaMatrix {
    data: Array2<LogProb>,
}

impl AlphaMatrix {
    fn zeroed(n_donor: usize, n_sites: usize) -> Self {
        AlphaMatrix {
            data: Array2::from_elem((n_sites, n_donor), LogProb::ln_zero()),
        }
    }

    #[inline]
    pub fn get(&self, site: usize, donor: usize) -> LogProb {
        self.data[[site, donor]]
    }

    #[inline]
    fn set(&mut self, site: usize, donor: usize, value: LogProb) {
        self.data[[site, donor]] = value;
    }

    #[inline]
    pub fn row(&self, site: usize) -> &[LogProb] {
        self.data.row(site).into_slice().expect("row-major alpha matrix rows are contiguous")
    }

    pub fn n_donor(&self) -> usize {
        self.data.ncols()
    }

    pub fn n_sites(&self) -> usize {
        self.data.nrows()
    }
}

/// Runs the forward recurrence for one recipient haplotype and returns
/// the full log-α matrix together with the scalar log-likelihood.
///
/// `A_sum[i]` (for `i < n_sites - 1`) is `log Σ_h exp(α[h][i]) ·
/// TransProb[i]`; the final site uses the unweighted sum directly as
/// the log-likelihood (§4.3).
pub fn forward(
    emission: &EmissionModel,
    copy_prob_start: &[f64],
    copy_prob: &[f64],
    trans_prob: &[f64],
    n_donor: usize,
    n_sites: usize,
) -> Result<(AlphaMatrix, LogProb), Error> {
    let mut alpha = AlphaMatrix::zeroed(n_donor, n_sites);

    for h in 0..n_donor {
        let value = ln(copy_prob_start[h]) + ln(emission.prob(h, 0));
        alpha.set(0, h, value);
    }

    for i in 1..n_sites {
        // A_sum_{i-1} = log Σ_h exp(α[h][i-1]) · TransProb[i-1]
        let a_sum_prev = log_sum_exp(alpha.row(i - 1)) + ln(trans_prob[i - 1]);
        let one_minus_trans = ln(1.0 - trans_prob[i - 1]);

        for h in 0..n_donor {
            let jump_term = ln(copy_prob[h]) + a_sum_prev;
            let stay_term = one_minus_trans + alpha.get(i - 1, h);
            let value = ln(emission.prob(h, i)) + log_sum_exp(&[jump_term, stay_term]);
            alpha.set(i, h, value);
        }
    }

    let log_likelihood = log_sum_exp(alpha.row(n_sites - 1));
    if is_numerically_unusable(log_likelihood) {
        return Err(Error::NumericalUnderflow { context: "forward pass" });
    }

    Ok((alpha, log_likelihood))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Allele;
    use crate::core::transition::transition_probs;
    use approx::assert_relative_eq;

    /// S1: two identical donors, one matching recipient, haploid, single
    /// site-set (spec §8).
    #[test]
    fn identical_donors_matching_recipient() {
        let positions = vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0];
        let recom_map = vec![1e-8; 4];
        let n_e = 400_000.0 / 3.0;
        let trans_prob = transition_probs(&positions, &recom_map, n_e, false);

        let recipient: Vec<Allele> = vec![Allele::Zero; 5];
        let donor_a: Vec<Allele> = vec![Allele::Zero; 5];
        let donor_b: Vec<Allele> = vec![Allele::Zero; 5];
        let donors = vec![donor_a, donor_b];
        let mu = vec![0.001, 0.001];
        let emission = EmissionModel::new(&recipient, &donors, &mu);

        let copy_prob = vec![0.5, 0.5];
        let (_, log_likelihood) = forward(&emission, &copy_prob, &copy_prob, &trans_prob, 2, 5).unwrap();

        let expected = 5.0 * (1.0 - 0.001f64).ln();
        assert_relative_eq!(*log_likelihood, expected, epsilon = 1e-6);
    }

    #[test]
    fn underflow_is_reported_as_numerical_error() {
        let positions = vec![0.0, 1000.0];
        let recom_map = vec![1e-8];
        let trans_prob = transition_probs(&positions, &recom_map, 1000.0, false);
        let recipient: Vec<Allele> = vec![Allele::Zero, Allele::Zero];
        let donors = vec![vec![Allele::One, Allele::One]];
        // mutation rate of 0 with a guaranteed mismatch forces emission
        // probability to exactly zero at every site.
        let mu = vec![0.0];
        let emission = EmissionModel::new(&recipient, &donors, &mu);
        let copy_prob = vec![1.0];
        let result = forward(&emission, &copy_prob, &copy_prob, &trans_prob, 1, 2);
        assert!(matches!(result, Err(Error::NumericalUnderflow { .. })));
    }
}
