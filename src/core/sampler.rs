//! C6: stochastic backward traceback (§4.5). Fires only on the final EM
//! iteration; draws `nsamplesTOT` independent hidden-state sequences
//! from the posterior given `log_alpha` and `TransProb`.

use bio::stats::LogProb;
use rand::Rng;

use crate::core::forward::AlphaMatrix;
use crate::core::numeric::{draw_uniform, ln, log_sum_exp, sample_categorical};

/// Draws `n_samples` independent donor-index sequences (0-based; callers
/// writing the `.samples.out` format add 1). Each sequence has length
/// `alpha.n_sites()`.
pub fn sample_paths(
    alpha: &AlphaMatrix,
    trans_prob: &[f64],
    copy_prob: &[f64],
    n_samples: usize,
    rng: &mut impl Rng,
) -> Vec<Vec<usize>> {
    let n_sites = alpha.n_sites();
    (0..n_samples).map(|_| sample_one_path(alpha, trans_prob, copy_prob, n_sites, rng)).collect()
}

fn sample_one_path(
    alpha: &AlphaMatrix,
    trans_prob: &[f64],
    copy_prob: &[f64],
    n_sites: usize,
    rng: &mut impl Rng,
) -> Vec<usize> {
    let mut path = vec![0usize; n_sites];

    let last_row = alpha.row(n_sites - 1);
    path[n_sites - 1] = sample_categorical(last_row, rng);

    for i in (0..n_sites - 1).rev() {
        let s_next = path[i + 1];
        let row_i = alpha.row(i);

        let no_switch_numer = (*alpha.get(i, s_next)).exp() * (1.0 - trans_prob[i]);
        let jump_mass: f64 = row_i
            .iter()
            .map(|a| (**a).exp())
            .sum::<f64>()
            * trans_prob[i]
            * copy_prob[s_next];
        let z = jump_mass + no_switch_numer;
        let no_switch = if z > 0.0 { no_switch_numer / z } else { 0.0 };

        let v = draw_uniform(rng);
        if v <= no_switch {
            path[i] = s_next;
        } else {
            let log_weights: Vec<LogProb> =
                row_i.iter().map(|a| *a + ln(trans_prob[i]) + ln(copy_prob[s_next])).collect();
            path[i] = sample_categorical(&log_weights, rng);
        }
    }

    path
}

/// Helper used by callers that want the total posterior mass at a site
/// without drawing a sample (shared log-sum-exp path with the rest of
/// the core, spec §9).
pub fn site_log_total(alpha: &AlphaMatrix, site: usize) -> LogProb {
    log_sum_exp(alpha.row(site))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Allele;
    use crate::core::emission::EmissionModel;
    use crate::core::forward::forward;
    use crate::core::transition::transition_probs;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn disjoint_donors_sampled_paths_track_recipient() {
        let positions = vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0];
        let recom_map = vec![1e-8; 4];
        let n_e = 400_000.0 / 3.0;
        let trans_prob = transition_probs(&positions, &recom_map, n_e, false);
        let donor_a = vec![Allele::Zero; 5];
        let donor_b = vec![Allele::One; 5];
        let recipient = vec![Allele::Zero, Allele::Zero, Allele::Zero, Allele::One, Allele::One];
        let mu = vec![0.0001, 0.0001];
        let emission = EmissionModel::new(&recipient, &[donor_a, donor_b], &mu);
        let copy_prob = vec![0.5, 0.5];
        let (alpha, _) = forward(&emission, &copy_prob, &copy_prob, &trans_prob, 2, 5).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let paths = sample_paths(&alpha, &trans_prob, &copy_prob, 50, &mut rng);

        let mut donor_a_at_0 = 0;
        let mut donor_b_at_4 = 0;
        for path in &paths {
            if path[0] == 0 {
                donor_a_at_0 += 1;
            }
            if path[4] == 1 {
                donor_b_at_4 += 1;
            }
        }
        assert!(donor_a_at_0 > 45);
        assert!(donor_b_at_4 > 45);
    }

    #[test]
    fn single_donor_path_is_deterministic() {
        let positions = vec![0.0, 1000.0, 2000.0];
        let recom_map = vec![1e-8; 2];
        let trans_prob = transition_probs(&positions, &recom_map, 1000.0, false);
        let donor = vec![Allele::Zero; 3];
        let recipient = vec![Allele::Zero; 3];
        let mu = vec![0.001];
        let emission = EmissionModel::new(&recipient, &[donor], &mu);
        let copy_prob = vec![1.0];
        let (alpha, _) = forward(&emission, &copy_prob, &copy_prob, &trans_prob, 1, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let paths = sample_paths(&alpha, &trans_prob, &copy_prob, 5, &mut rng);
        for path in paths {
            assert_eq!(path, vec![0, 0, 0]);
        }
    }
}
