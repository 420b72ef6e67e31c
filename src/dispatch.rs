//! C8: the recipient dispatcher. Reads the three input files once,
//! partitions haplotypes into donor/recipient roles for the selected
//! mode, and runs the EM driver (C7) once per recipient individual.

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cli::Opt;
use crate::constants::DEFAULT_NE_NUMERATOR;
use crate::core::dataset::{default_mutation_rate, Allele, Dataset, DatasetBuilder, DonorMetadata, HmmParams};
use crate::core::em::{run_em, EmFlags};
use crate::errors::Error;
use crate::io::donor_list::read_donor_list;
use crate::io::genotype::read_genotype_file;
use crate::io::recomb_map::read_recomb_map;
use crate::io::writers::OutputWriters;
use crate::option_validator;

/// One recipient individual's donor set and population bookkeeping,
/// fully resolved before the EM driver runs (spec §9: "mode selection
/// determines how rows are partitioned, not which reader runs").
struct RecipientJob {
    label: String,
    dataset: Dataset,
}

pub fn run(opt: &Opt) -> Result<(), Error> {
    let k = if opt.haploid { 1 } else { 2 };

    let geno = read_genotype_file(&opt.geno, opt.haploid, opt.jitter)?;
    let positions = geno.positions.clone();
    let total_haps = geno.haps.len();

    let recom_map = if opt.unlinked {
        vec![-1.0; positions.len().saturating_sub(1)]
    } else {
        let path = opt.recomb_map.as_ref().expect("validated: -r required unless -u");
        read_recomb_map(path, &positions, opt.jitter)?
    };

    let all_vs_all = opt.all_vs_all.is_some();
    option_validator::validate_donor_count(geno.nhaps_startpop, all_vs_all)?;

    let donor_list = match &opt.donor_list {
        Some(path) => Some(read_donor_list(path)?),
        None => None,
    };

    if let (Some(dl), false) = (&donor_list, all_vs_all) {
        let found: usize = dl.pop_sizes.iter().sum();
        option_validator::validate_donor_list_total(found, geno.nhaps_startpop, total_haps)?;
        if let Some(priors) = &dl.priors {
            option_validator::validate_prior_sum(priors, opt.conditioning)?;
        }
    }

    let n_e_start = opt.n_e_start.unwrap_or(DEFAULT_NE_NUMERATOR / total_haps as f64);

    let lambda: Vec<f64> = (0..recom_map.len())
        .map(|i| {
            if recom_map[i] < 0.0 {
                recom_map[i]
            } else {
                (positions[i + 1] - positions[i]) * recom_map[i] * crate::constants::DELTA
            }
        })
        .collect();

    let jobs = if all_vs_all {
        build_all_vs_all_jobs(&geno.haps, &positions, &recom_map, &lambda, k, opt)
    } else if opt.conditioning {
        build_conditioning_jobs(&geno.haps, &positions, &recom_map, &lambda, geno.nhaps_startpop, k, donor_list.as_ref(), opt)
    } else {
        build_donor_mode_jobs(&geno.haps, &positions, &recom_map, &lambda, geno.nhaps_startpop, k, donor_list.as_ref(), opt)
    };

    let prefix = opt.output_prefix();
    let mut writers = OutputWriters::create(&prefix, opt.emit_per_locus)?;
    let mut rng = StdRng::from_entropy();

    for job in jobs {
        info!("running EM for {}", job.label);
        job.dataset.validate()?;
        let n_donor = job.dataset.n_donors();
        let pop_sizes = job.dataset.donors().pop_sizes().clone();
        let pop_vec = job.dataset.donors().pop_vec().clone();

        let mut_rate = resolve_mut_rate(opt, job.dataset.donors(), n_donor, total_haps);
        let copy_prob = resolve_copy_prob(opt, job.dataset.donors(), n_donor);

        let params = HmmParams::new(n_e_start, copy_prob.clone(), copy_prob, mut_rate);

        let flags = EmFlags {
            maximize_n_e: opt.maximize_n_e,
            maximize_copy_prob: opt.maximize_copy_prob,
            maximize_mut_rate_per_pop: opt.maximize_mut_rate_per_pop,
            maximize_mut_rate_global: opt.maximize_mut_rate_global,
        };

        let output = run_em(
            job.dataset.recipient_haps(),
            job.dataset.donor_haps(),
            job.dataset.positions(),
            job.dataset.recom_map(),
            opt.unlinked,
            &pop_vec,
            &pop_sizes,
            params,
            opt.em_iters,
            flags,
            opt.n_samples,
            opt.region_size,
            opt.emit_per_locus,
            &mut rng,
        )?;

        writers.write_recipient(&job.label, &output)?;
    }

    writers.finish()
}

/// Expands the donor list's per-population mutation rate column to one
/// entry per donor haplotype via `pop_vec`, the same way `resolve_copy_prob`
/// expands per-population priors.
fn resolve_mut_rate(opt: &Opt, donors: &DonorMetadata, n_donor: usize, total_haps: usize) -> Vec<f64> {
    if opt.donor_mut_rate_self.is_some() {
        if let Some(mut_rates) = donors.mut_rates().as_ref() {
            if mut_rates.len() == donors.pop_sizes().len() {
                return donors.pop_vec().iter().map(|&p| mut_rates[p]).collect();
            }
        }
        return vec![opt.donor_mut_rate_self.unwrap_or(0.0); n_donor];
    }
    let mu = opt.global_mut_rate.unwrap_or_else(|| default_mutation_rate(n_donor, total_haps));
    vec![mu; n_donor]
}

fn resolve_copy_prob(opt: &Opt, donors: &DonorMetadata, n_donor: usize) -> Vec<f64> {
    if opt.use_priors {
        if let Some(priors) = donors.prior_copy_prob().as_ref() {
            if priors.len() == donors.pop_sizes().len() {
                return donors
                    .pop_vec()
                    .iter()
                    .map(|&p| priors[p] / donors.pop_sizes()[p] as f64)
                    .collect();
            }
        }
    }
    vec![1.0 / n_donor as f64; n_donor]
}

fn label_for(idx: usize, suppress_suffix: bool) -> String {
    if suppress_suffix {
        "ind".to_owned()
    } else {
        format!("ind{}", idx + 1)
    }
}

#[allow(clippy::too_many_arguments)]
fn make_dataset(
    positions: &[f64],
    recom_map: &[f64],
    lambda: &[f64],
    donor_haps: Vec<Vec<Allele>>,
    recipient_haps: Vec<Vec<Allele>>,
    nhaps_startpop: usize,
    donors: DonorMetadata,
    unlinked: bool,
) -> Dataset {
    DatasetBuilder::default()
        .positions(positions.to_vec())
        .lambda(lambda.to_vec())
        .recom_map(recom_map.to_vec())
        .donor_haps(donor_haps)
        .recipient_haps(recipient_haps)
        .nhaps_startpop(nhaps_startpop)
        .donors(donors)
        .unlinked(unlinked)
        .build()
        .expect("all Dataset fields are set above")
}

fn build_donor_mode_jobs(
    haps: &[Vec<Allele>],
    positions: &[f64],
    recom_map: &[f64],
    lambda: &[f64],
    nhaps_startpop: usize,
    k: usize,
    donor_list: Option<&crate::io::donor_list::DonorListFile>,
    opt: &Opt,
) -> Vec<RecipientJob> {
    let donor_haps = haps[..nhaps_startpop].to_vec();
    let pop_sizes = pop_sizes_from(donor_list, nhaps_startpop);
    let pop_vec = pop_vec_from_sizes(&pop_sizes);
    let priors = donor_list.and_then(|dl| dl.priors.clone());
    let mut_rates = donor_list.and_then(|dl| dl.mut_rates.clone());

    haps[nhaps_startpop..]
        .chunks(k)
        .enumerate()
        .map(|(idx, chunk)| {
            let donors = DonorMetadata::new(pop_sizes.clone(), pop_vec.clone(), priors.clone(), mut_rates.clone());
            let dataset = make_dataset(
                positions,
                recom_map,
                lambda,
                donor_haps.clone(),
                chunk.to_vec(),
                nhaps_startpop,
                donors,
                opt.unlinked,
            );
            RecipientJob { label: label_for(idx, opt.suppress_suffix), dataset }
        })
        .collect()
}

/// §4.7 recipient-conditioning: every recipient's donor set is the base
/// donor panel plus every *other* recipient's haplotypes, grouped under
/// one extra "self" population.
fn build_conditioning_jobs(
    haps: &[Vec<Allele>],
    positions: &[f64],
    recom_map: &[f64],
    lambda: &[f64],
    nhaps_startpop: usize,
    k: usize,
    donor_list: Option<&crate::io::donor_list::DonorListFile>,
    opt: &Opt,
) -> Vec<RecipientJob> {
    let base_donor_haps = haps[..nhaps_startpop].to_vec();
    let base_pop_sizes = pop_sizes_from(donor_list, nhaps_startpop);
    let base_pop_vec = pop_vec_from_sizes(&base_pop_sizes);
    let base_priors = donor_list.and_then(|dl| dl.priors.clone());
    let base_mut_rates = donor_list.and_then(|dl| dl.mut_rates.clone());

    let recipients: Vec<&[Vec<Allele>]> = haps[nhaps_startpop..].chunks(k).collect();

    recipients
        .iter()
        .enumerate()
        .map(|(idx, &own)| {
            let mut donor_haps = base_donor_haps.clone();
            let mut pop_vec = base_pop_vec.clone();
            let mut pop_sizes = base_pop_sizes.clone();

            let self_pop_idx = pop_sizes.len();
            let mut self_count = 0usize;
            for (other_idx, &other) in recipients.iter().enumerate() {
                if other_idx == idx {
                    continue;
                }
                for hap in other {
                    donor_haps.push(hap.clone());
                    pop_vec.push(self_pop_idx);
                    self_count += 1;
                }
            }
            pop_sizes.push(self_count);

            let donors = DonorMetadata::new(pop_sizes, pop_vec, base_priors.clone(), base_mut_rates.clone());
            let dataset = make_dataset(
                positions,
                recom_map,
                lambda,
                donor_haps,
                own.to_vec(),
                nhaps_startpop,
                donors,
                opt.unlinked,
            );
            RecipientJob { label: label_for(idx, opt.suppress_suffix), dataset }
        })
        .collect()
}

/// §4.7 all-vs-all: `nhaps_startpop` is 0; every other individual is a
/// donor population of its own. The self individual is simply skipped
/// when building its own job, so there is no need to shift population
/// indices downstream the way the reference implementation's static
/// arrays required.
fn build_all_vs_all_jobs(haps: &[Vec<Allele>], positions: &[f64], recom_map: &[f64], lambda: &[f64], k: usize, opt: &Opt) -> Vec<RecipientJob> {
    let individuals: Vec<&[Vec<Allele>]> = haps.chunks(k).collect();
    let n_ind = individuals.len();

    let (start, end) = match &opt.all_vs_all {
        Some(values) if values.len() == 2 => {
            let start = values[0];
            let end = if values[1] == 0 { n_ind } else { values[1] };
            (start, end)
        }
        _ => (0, n_ind),
    };

    (start..end)
        .map(|idx| {
            let own = individuals[idx];
            let mut donor_haps = Vec::new();
            let mut pop_vec = Vec::new();
            let mut pop_sizes = Vec::new();

            for (other_idx, &other) in individuals.iter().enumerate() {
                if other_idx == idx {
                    continue;
                }
                let pop_idx = pop_sizes.len();
                pop_sizes.push(other.len());
                for hap in other {
                    donor_haps.push(hap.clone());
                    pop_vec.push(pop_idx);
                }
            }

            let donors = DonorMetadata::new(pop_sizes, pop_vec, None, None);
            let dataset = make_dataset(positions, recom_map, lambda, donor_haps, own.to_vec(), 0, donors, opt.unlinked);
            RecipientJob { label: label_for(idx, opt.suppress_suffix), dataset }
        })
        .collect()
}

fn pop_sizes_from(donor_list: Option<&crate::io::donor_list::DonorListFile>, nhaps_startpop: usize) -> Vec<usize> {
    match donor_list {
        Some(dl) => dl.pop_sizes.clone(),
        None => vec![nhaps_startpop],
    }
}

fn pop_vec_from_sizes(pop_sizes: &[usize]) -> Vec<usize> {
    let mut pop_vec = Vec::new();
    for (p, &size) in pop_sizes.iter().enumerate() {
        pop_vec.extend(std::iter::repeat(p).take(size));
    }
    pop_vec
}
