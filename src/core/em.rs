//! C7: the per-recipient EM driver (§4.6). Runs `EMruns + 1` iterations
//! over one recipient's `K` haplotypes, averaging sufficient statistics
//! across them, applying the subset of parameter updates the caller
//! selected, and on the final iteration also drawing posterior samples
//! and (optionally) per-locus posteriors.

use rand::Rng;

use crate::constants::SMALL_COPY_VAL;
use crate::core::backward::{backward_pass, Accumulators};
use crate::core::dataset::{Allele, HmmParams};
use crate::core::emission::EmissionModel;
use crate::core::forward::forward;
use crate::core::numeric::is_numerically_unusable;
use crate::core::sampler::sample_paths;
use crate::core::transition::transition_probs;
use crate::errors::Error;

/// Which parameters this run's flags select for maximization (§4.8:
/// `-in`/`-ip`/`-im`/`-iM`). Parameters not selected are carried forward
/// unchanged across iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmFlags {
    pub maximize_n_e: bool,
    pub maximize_copy_prob: bool,
    pub maximize_mut_rate_per_pop: bool,
    pub maximize_mut_rate_global: bool,
}

/// Everything the output writer (C9) needs from one recipient's EM run.
pub struct RecipientEmOutput {
    pub log_likelihoods: Vec<f64>,
    pub copy_prob_pop: Vec<f64>,
    pub chunk_count_pop: Vec<f64>,
    pub chunk_length_pop: Vec<f64>,
    pub mutationprob_pop: Vec<f64>,
    pub regional_chunk_count_pop: Vec<f64>,
    pub regional_chunk_count_sq_pop: Vec<f64>,
    pub num_regions: usize,
    /// `samples[hap][sample][site]`.
    pub samples: Vec<Vec<Vec<usize>>>,
    /// `locus_posteriors[hap][site][pop]`.
    pub locus_posteriors: Option<Vec<Vec<Vec<f64>>>>,
    pub final_params: HmmParams,
}

#[allow(clippy::too_many_arguments)]
pub fn run_em(
    recipient_haps: &[Vec<Allele>],
    donor_haps: &[Vec<Allele>],
    positions: &[f64],
    recom_map: &[f64],
    unlinked: bool,
    pop_vec: &[usize],
    pop_sizes: &[usize],
    mut params: HmmParams,
    em_runs: usize,
    flags: EmFlags,
    n_samples: usize,
    region_size: f64,
    collect_locus_posteriors: bool,
    rng: &mut impl Rng,
) -> Result<RecipientEmOutput, Error> {
    let n_sites = positions.len();
    let n_donor = donor_haps.len();
    let n_pops = pop_sizes.len();
    let k = recipient_haps.len();

    let mut log_likelihoods = Vec::with_capacity(em_runs + 1);
    let mut final_acc: Option<Accumulators> = None;
    let mut samples: Vec<Vec<Vec<usize>>> = Vec::with_capacity(k);
    let mut locus_posteriors: Option<Vec<Vec<Vec<f64>>>> =
        if collect_locus_posteriors { Some(Vec::with_capacity(k)) } else { None };

    for iter in 0..=em_runs {
        let is_final = iter == em_runs;
        let trans_prob = transition_probs(positions, recom_map, *params.n_e(), unlinked);

        let mut hap_accs: Vec<Accumulators> = Vec::with_capacity(k);
        let mut iter_ll_sum = 0.0_f64;

        if is_final {
            samples.clear();
            if let Some(lp) = locus_posteriors.as_mut() {
                lp.clear();
            }
        }

        for recipient_hap in recipient_haps {
            let emission = EmissionModel::new(recipient_hap, donor_haps, params.mut_rate());
            let (alpha, log_likelihood) = forward(
                &emission,
                params.copy_prob_start(),
                params.copy_prob(),
                &trans_prob,
                n_donor,
                n_sites,
            )?;
            iter_ll_sum += *log_likelihood;

            let acc = backward_pass(
                &alpha,
                &emission,
                params.copy_prob(),
                &trans_prob,
                recom_map,
                positions,
                unlinked,
                region_size,
                pop_vec,
                n_pops,
                log_likelihood,
                is_final && collect_locus_posteriors,
            );

            if is_final {
                let paths = sample_paths(&alpha, &trans_prob, params.copy_prob(), n_samples, rng);
                samples.push(paths);
                if let Some(lp) = locus_posteriors.as_mut() {
                    lp.push(acc.locus_posteriors.clone().unwrap_or_default());
                }
            }

            hap_accs.push(acc);
        }

        log_likelihoods.push(iter_ll_sum);
        if is_numerically_unusable(bio::stats::LogProb(iter_ll_sum)) {
            return Err(Error::NumericalUnderflow { context: "EM iteration log-likelihood" });
        }

        let combined = combine_accumulators(&hap_accs, n_donor, n_pops);

        if !is_final {
            if flags.maximize_n_e {
                let new_n_e = update_n_e(*params.n_e(), positions, recom_map, unlinked, &combined.per_interval_transition_prob, combined.total_gen_dist, k);
                params.set_n_e(new_n_e);
            }
            if flags.maximize_copy_prob {
                let new_copy_prob = aggregate_and_redistribute(&combined.new_copy_prob, pop_sizes, pop_vec);
                let new_copy_prob_start = aggregate_and_redistribute(&combined.start_posterior, pop_sizes, pop_vec);
                params.set_copy_prob(new_copy_prob);
                params.set_copy_prob_start(new_copy_prob_start);
            }
            if flags.maximize_mut_rate_per_pop {
                let new_mu = update_mut_rate_per_pop(&combined.differences, pop_sizes, pop_vec, n_sites, k);
                params.set_mut_rate(new_mu);
            } else if flags.maximize_mut_rate_global {
                let new_mu = update_mut_rate_global(&combined.differences, n_sites, k, n_donor);
                params.set_mut_rate(new_mu);
            }
        } else {
            final_acc = Some(combined);
        }
    }

    let combined = final_acc.expect("final iteration always runs");

    let copy_prob_pop = pop_sums(&combined.new_copy_prob, pop_sizes, pop_vec);
    let copy_prob_pop_total: f64 = copy_prob_pop.iter().sum();
    let copy_prob_pop = if copy_prob_pop_total > 0.0 {
        copy_prob_pop.iter().map(|v| v / copy_prob_pop_total).collect()
    } else {
        copy_prob_pop
    };

    let chunk_count_pop = pop_sums(&combined.chunk_count, pop_sizes, pop_vec);
    let chunk_length_pop = pop_sums(&combined.chunk_length, pop_sizes, pop_vec);
    let mutationprob_pop = update_mut_rate_per_pop(&combined.differences, pop_sizes, pop_vec, n_sites, k);
    let mutationprob_pop: Vec<f64> = {
        let mut seen = vec![None; pop_sizes.len()];
        for (h, &p) in pop_vec.iter().enumerate() {
            if seen[p].is_none() {
                seen[p] = Some(mutationprob_pop[h]);
            }
        }
        seen.into_iter().map(|v| v.unwrap_or(0.0)).collect()
    };

    Ok(RecipientEmOutput {
        log_likelihoods,
        copy_prob_pop,
        chunk_count_pop,
        chunk_length_pop,
        mutationprob_pop,
        regional_chunk_count_pop: combined.regional_chunk_count_sum_final.clone(),
        regional_chunk_count_sq_pop: combined.regional_chunk_count_sum_squared_final.clone(),
        num_regions: combined.num_regions,
        samples,
        locus_posteriors,
        final_params: params,
    })
}

/// Sums of a per-donor statistic broken down by its population.
fn pop_sums(per_donor: &[f64], pop_sizes: &[usize], pop_vec: &[usize]) -> Vec<f64> {
    let mut sums = vec![0.0; pop_sizes.len()];
    for (h, &value) in per_donor.iter().enumerate() {
        sums[pop_vec[h]] += value;
    }
    sums
}

/// §4.4 "copying-proportion update": aggregate to per-population shares,
/// floor zeros, renormalize, then redistribute uniformly within each
/// population.
fn aggregate_and_redistribute(per_donor: &[f64], pop_sizes: &[usize], pop_vec: &[usize]) -> Vec<f64> {
    let total: f64 = per_donor.iter().sum();
    let mut pop_share = pop_sums(per_donor, pop_sizes, pop_vec);
    if total > 0.0 {
        for p in pop_share.iter_mut() {
            *p /= total;
        }
    }
    for (p, share) in pop_share.iter_mut().enumerate() {
        if *share <= 0.0 {
            *share = SMALL_COPY_VAL * pop_sizes[p] as f64;
        }
    }
    let renorm: f64 = pop_share.iter().sum();
    for share in pop_share.iter_mut() {
        *share /= renorm;
    }

    pop_vec
        .iter()
        .map(|&p| pop_share[p] / pop_sizes[p] as f64)
        .collect()
}

/// §4.4 N_e update, combined across the recipient's `K` haplotypes
/// (averaged by dividing through by `k`, mirroring the reference
/// implementation's `/ (2.0 - haploid_ind)` division).
fn update_n_e(
    n_e_old: f64,
    positions: &[f64],
    recom_map: &[f64],
    unlinked: bool,
    combined_p_trans: &[f64],
    total_gen_dist: f64,
    k: usize,
) -> f64 {
    if unlinked || total_gen_dist <= 0.0 {
        return n_e_old;
    }
    let mut sum = 0.0;
    for (i, &p_trans) in combined_p_trans.iter().enumerate() {
        if recom_map[i] < 0.0 {
            continue;
        }
        let d_i = (positions[i + 1] - positions[i]) * recom_map[i];
        if d_i <= 0.0 {
            continue;
        }
        let factor = (n_e_old * d_i) / (1.0 - (-n_e_old * d_i).exp());
        sum += factor * p_trans;
    }
    (sum / total_gen_dist) / k as f64
}

/// §4.4 per-population mutation-rate update: `μ_p = Σ_{h∈p}
/// differences[h] / (L·K)`, assigned to every donor in that population.
fn update_mut_rate_per_pop(differences: &[f64], pop_sizes: &[usize], pop_vec: &[usize], n_sites: usize, k: usize) -> Vec<f64> {
    let mu_pop = pop_sums(differences, pop_sizes, pop_vec);
    let denom = n_sites as f64 * k as f64;
    let mu_pop: Vec<f64> = mu_pop.iter().map(|v| v / denom).collect();
    pop_vec.iter().map(|&p| mu_pop[p]).collect()
}

/// Global mutation rate: sum of the per-population rates, applied to
/// every donor.
fn update_mut_rate_global(differences: &[f64], n_sites: usize, k: usize, n_donor: usize) -> Vec<f64> {
    let total: f64 = differences.iter().sum();
    let mu = total / (n_sites as f64 * k as f64);
    vec![mu; n_donor]
}

fn combine_accumulators(accs: &[Accumulators], n_donor: usize, n_pops: usize) -> Accumulators {
    let n_intervals = accs.first().map(|a| a.per_interval_transition_prob.len()).unwrap_or(0);
    let mut combined = Accumulators {
        new_copy_prob: vec![0.0; n_donor],
        chunk_count: vec![0.0; n_donor],
        chunk_length: vec![0.0; n_donor],
        differences: vec![0.0; n_donor],
        expected_transitions: 0.0,
        total_gen_dist: accs.first().map(|a| a.total_gen_dist).unwrap_or(0.0),
        per_interval_transition_prob: vec![0.0; n_intervals],
        regional_chunk_count_sum_final: vec![0.0; n_pops],
        regional_chunk_count_sum_squared_final: vec![0.0; n_pops],
        num_regions: 0,
        start_posterior: vec![0.0; n_donor],
        locus_posteriors: None,
    };

    for acc in accs {
        for h in 0..n_donor {
            combined.new_copy_prob[h] += acc.new_copy_prob[h];
            combined.chunk_count[h] += acc.chunk_count[h];
            combined.chunk_length[h] += acc.chunk_length[h];
            combined.differences[h] += acc.differences[h];
            combined.start_posterior[h] += acc.start_posterior[h];
        }
        combined.expected_transitions += acc.expected_transitions;
        for i in 0..n_intervals {
            combined.per_interval_transition_prob[i] += acc.per_interval_transition_prob[i];
        }
        for p in 0..n_pops {
            combined.regional_chunk_count_sum_final[p] += acc.regional_chunk_count_sum_final[p];
            combined.regional_chunk_count_sum_squared_final[p] += acc.regional_chunk_count_sum_squared_final[p];
        }
        combined.num_regions += acc.num_regions;
    }

    combined
}
