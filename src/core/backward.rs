//! C5: the backward pass and its posterior-weighted accumulators (§4.4).
//!
//! The backward recurrence itself is standard Li & Stephens (the
//! closed forms for `γ`/`ξ`/chunk-length mass are the ones spec §4.4
//! gives verbatim; the `β` recursion that produces `β[h][i]` from
//! `β[h][i+1]` is the textbook forward-backward companion to the
//! forward recurrence in `forward.rs` and is not spelled out
//! separately in the source this was distilled from).

use bio::stats::LogProb;

use crate::core::emission::EmissionModel;
use crate::core::forward::AlphaMatrix;
use crate::core::numeric::{ln, log_sum_exp};

/// Posterior-weighted sufficient statistics accumulated by one backward
/// pass over a single recipient haplotype. `EM driver (C7)` sums these
/// across a recipient's `K` haplotypes before applying the parameter
/// update rules.
#[derive(Debug, Clone)]
pub struct Accumulators {
    pub new_copy_prob: Vec<f64>,
    pub chunk_count: Vec<f64>,
    pub chunk_length: Vec<f64>,
    pub differences: Vec<f64>,
    pub expected_transitions: f64,
    pub total_gen_dist: f64,
    pub per_interval_transition_prob: Vec<f64>,
    pub regional_chunk_count_sum_final: Vec<f64>,
    pub regional_chunk_count_sum_squared_final: Vec<f64>,
    pub num_regions: usize,
    /// `γ_h(0)` per donor — the posterior of starting a copying run in
    /// state `h` — used to re-estimate `copy_prob_start` separately from
    /// `copy_prob` (§4.4: "the same update runs in parallel for the
    /// initial distribution").
    pub start_posterior: Vec<f64>,
    /// `locus_posteriors[site][pop] = Σ_{h∈pop} γ_h(site)`, only
    /// populated on the final EM iteration when requested.
    pub locus_posteriors: Option<Vec<Vec<f64>>>,
}

impl Accumulators {
    fn new(n_donor: usize, n_pops: usize, n_sites: usize, collect_locus_posteriors: bool) -> Self {
        Accumulators {
            new_copy_prob: vec![0.0; n_donor],
            chunk_count: vec![0.0; n_donor],
            chunk_length: vec![0.0; n_donor],
            differences: vec![0.0; n_donor],
            expected_transitions: 0.0,
            total_gen_dist: 0.0,
            per_interval_transition_prob: vec![0.0; n_sites.saturating_sub(1)],
            regional_chunk_count_sum_final: vec![0.0; n_pops],
            regional_chunk_count_sum_squared_final: vec![0.0; n_pops],
            num_regions: 0,
            start_posterior: vec![0.0; n_donor],
            locus_posteriors: if collect_locus_posteriors {
                Some(vec![vec![0.0; n_pops]; n_sites])
            } else {
                None
            },
        }
    }
}

/// Runs the backward pass over one recipient haplotype and accumulates
/// every sufficient statistic the EM update rules (§4.4, §4.6) need.
/// `pop_vec[h]` gives the population index of donor `h`; regional
/// counts and per-locus posteriors are both broken down by population.
#[allow(clippy::too_many_arguments)]
pub fn backward_pass(
    alpha: &AlphaMatrix,
    emission: &EmissionModel,
    copy_prob: &[f64],
    trans_prob: &[f64],
    lambda: &[f64],
    positions: &[f64],
    unlinked: bool,
    region_size: f64,
    pop_vec: &[usize],
    n_pops: usize,
    log_likelihood: LogProb,
    collect_locus_posteriors: bool,
) -> Accumulators {
    let n_donor = alpha.n_donor();
    let n_sites = alpha.n_sites();
    let ll: f64 = *log_likelihood;

    let mut acc = Accumulators::new(n_donor, n_pops, n_sites, collect_locus_posteriors);

    let mut beta_next: Vec<LogProb> = vec![LogProb::ln_one(); n_donor];
    let mut gamma_next: Vec<f64> = (0..n_donor).map(|h| (*alpha.get(n_sites - 1, h) - ll).exp()).collect();

    if let Some(posteriors) = acc.locus_posteriors.as_mut() {
        for h in 0..n_donor {
            posteriors[n_sites - 1][pop_vec[h]] += gamma_next[h];
        }
    }

    let mut running_total = 0.0_f64;
    let mut running_pop_sums = vec![0.0_f64; n_pops];

    let mut beta_curr = vec![LogProb::ln_zero(); n_donor];
    let mut gamma_curr = vec![0.0_f64; n_donor];

    for i in (0..n_sites - 1).rev() {
        // differences[h] at site i+1, using gamma computed for i+1 in
        // the previous loop iteration (or the L-1 initialization above).
        for h in 0..n_donor {
            if emission.mismatches(h, i + 1) {
                acc.differences[h] += gamma_next[h];
            }
        }

        let log_copy_emit: Vec<LogProb> = (0..n_donor)
            .map(|hp| ln(copy_prob[hp]) + ln(emission.prob(hp, i + 1)) + beta_next[hp])
            .collect();
        let b_sum_i = log_sum_exp(&log_copy_emit);
        let log_one_minus_trans = ln(1.0 - trans_prob[i]);
        let log_trans = ln(trans_prob[i]);

        for h in 0..n_donor {
            let stay = log_one_minus_trans + ln(emission.prob(h, i + 1)) + beta_next[h];
            let jump = log_trans + b_sum_i;
            beta_curr[h] = log_sum_exp(&[stay, jump]);
            gamma_curr[h] = (*alpha.get(i, h) + beta_curr[h] - ll).exp();
        }

        if let Some(posteriors) = acc.locus_posteriors.as_mut() {
            for h in 0..n_donor {
                posteriors[i][pop_vec[h]] += gamma_curr[h];
            }
        }

        let skip_distance = lambda[i] < 0.0 || unlinked;
        let mut total_xi_i = 0.0_f64;

        for h in 0..n_donor {
            let to_i_to_i = (*alpha.get(i, h) + beta_next[h] - ll).exp()
                * emission.prob(h, i + 1)
                * (1.0 - trans_prob[i] + trans_prob[i] * copy_prob[h]);
            let to_i_exclude_i = gamma_next[h] - to_i_to_i;
            let from_i_exclude_i = gamma_curr[h] - to_i_to_i;
            let chunk_length_mass = to_i_to_i + 0.5 * (to_i_exclude_i + from_i_exclude_i);

            let xi = gamma_next[h]
                - (*alpha.get(i, h) + beta_next[h] - ll).exp() * emission.prob(h, i + 1) * (1.0 - trans_prob[i]);

            acc.new_copy_prob[h] += xi;
            acc.expected_transitions += xi;
            total_xi_i += xi;
            running_pop_sums[pop_vec[h]] += xi;

            if !skip_distance {
                let dist = (positions[i + 1] - positions[i]) * lambda[i];
                acc.chunk_length[h] += 100.0 * dist * chunk_length_mass;
            }
        }

        acc.per_interval_transition_prob[i] = total_xi_i;
        if !skip_distance {
            acc.total_gen_dist += (positions[i + 1] - positions[i]) * lambda[i];
        }

        running_total += total_xi_i;
        if running_total > region_size {
            for p in 0..n_pops {
                acc.regional_chunk_count_sum_final[p] += running_pop_sums[p];
                acc.regional_chunk_count_sum_squared_final[p] += running_pop_sums[p] * running_pop_sums[p];
                running_pop_sums[p] = 0.0;
            }
            acc.num_regions += 1;
            running_total = 0.0;
        }

        beta_next.clone_from(&beta_curr);
        gamma_next.clone_from(&gamma_curr);
    }

    // final corrections at site 0: the first chunk is not preceded by a
    // jump, so its mass is added to chunk_count and differences directly
    // rather than via xi.
    for h in 0..n_donor {
        acc.chunk_count[h] += acc.new_copy_prob[h];
        acc.chunk_count[h] += gamma_curr[h];
        acc.start_posterior[h] = gamma_curr[h];
        if emission.mismatches(h, 0) {
            acc.differences[h] += gamma_curr[h];
        }
    }

    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Allele;
    use crate::core::forward::forward;
    use crate::core::transition::transition_probs;
    use approx::assert_relative_eq;

    fn setup() -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<Vec<Allele>>, Vec<Allele>) {
        let positions = vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0];
        let recom_map = vec![1e-8; 4];
        let donor_a = vec![Allele::Zero; 5];
        let donor_b = vec![Allele::Zero; 5];
        let recipient = vec![Allele::Zero; 5];
        (positions, recom_map, vec![0.5, 0.5], vec![donor_a, donor_b], recipient)
    }

    #[test]
    fn posterior_sums_to_one_at_every_site() {
        let (positions, recom_map, copy_prob, donors, recipient) = setup();
        let n_e = 400_000.0 / 3.0;
        let trans_prob = transition_probs(&positions, &recom_map, n_e, false);
        let mu = vec![0.001, 0.001];
        let emission = EmissionModel::new(&recipient, &donors, &mu);
        let (alpha, ll) = forward(&emission, &copy_prob, &copy_prob, &trans_prob, 2, 5).unwrap();

        let pop_vec = vec![0, 1];
        let acc = backward_pass(
            &alpha, &emission, &copy_prob, &trans_prob, &recom_map, &positions, false, 100.0, &pop_vec, 2, ll, true,
        );

        let posteriors = acc.locus_posteriors.unwrap();
        for site_sums in &posteriors {
            let total: f64 = site_sums.iter().sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn disjoint_donors_favor_matching_half() {
        let positions = vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0];
        let recom_map = vec![1e-8; 4];
        let n_e = 400_000.0 / 3.0;
        let trans_prob = transition_probs(&positions, &recom_map, n_e, false);
        let donor_a = vec![Allele::Zero; 5];
        let donor_b = vec![Allele::One; 5];
        let recipient = vec![Allele::Zero, Allele::Zero, Allele::Zero, Allele::One, Allele::One];
        let mu = vec![0.001, 0.001];
        let emission = EmissionModel::new(&recipient, &[donor_a, donor_b], &mu);
        let copy_prob = vec![0.5, 0.5];
        let (alpha, ll) = forward(&emission, &copy_prob, &copy_prob, &trans_prob, 2, 5).unwrap();

        let pop_vec = vec![0, 1];
        let acc = backward_pass(
            &alpha, &emission, &copy_prob, &trans_prob, &recom_map, &positions, false, 100.0, &pop_vec, 2, ll, true,
        );
        let posteriors = acc.locus_posteriors.unwrap();
        assert!(posteriors[0][0] > posteriors[0][1]);
        assert!(posteriors[4][1] > posteriors[4][0]);
    }
}
