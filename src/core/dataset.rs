//! §3: the data model. `Dataset` is built once per run by the `io`
//! readers and is immutable afterwards; `HmmParams` is the mutable
//! parameter block that the EM driver clones per recipient and mutates
//! in place across iterations.

use derive_builder::Builder;
use getset::Getters;

use crate::constants::SMALL_COPY_VAL;
use crate::errors::Error;

/// One of the six alleles the PHASE-style genotype format allows. Stored
/// as a small enum rather than a raw `u8` so that parsing invalid
/// characters and comparing alleles both go through the type system
/// (mirrors the teacher's habit of wrapping raw bases in small,
/// `Copy` newtypes, e.g. `AlleleFreq`/`StrandBias` in `model/`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Allele {
    Zero,
    One,
    A,
    C,
    G,
    T,
}

impl Allele {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Allele::Zero),
            '1' => Some(Allele::One),
            'A' | 'a' => Some(Allele::A),
            'C' | 'c' => Some(Allele::C),
            'G' | 'g' => Some(Allele::G),
            'T' | 't' => Some(Allele::T),
            _ => None,
        }
    }
}

/// Donor population metadata: which population each donor haplotype
/// belongs to, how large each population is, and the (optional) priors
/// and mutation rates that came with it from the donor list.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct DonorMetadata {
    pop_sizes: Vec<usize>,
    pop_vec: Vec<usize>,
    prior_copy_prob: Option<Vec<f64>>,
    mut_rates: Option<Vec<f64>>,
}

impl DonorMetadata {
    pub fn new(pop_sizes: Vec<usize>, pop_vec: Vec<usize>, prior_copy_prob: Option<Vec<f64>>, mut_rates: Option<Vec<f64>>) -> Self {
        DonorMetadata {
            pop_sizes,
            pop_vec,
            prior_copy_prob,
            mut_rates,
        }
    }

    pub fn n_pops(&self) -> usize {
        self.pop_sizes.len()
    }
}

/// Immutable, once-built input to the HMM engine (§3). `recom_map` and
/// `lambda` both carry the per-interval "negative means chromosome
/// break" convention; `recom_map` is the raw map the caller supplied
/// (floored to `MIN_RECOM_RATE` when small and non-negative), `lambda`
/// is the scaling factor actually used by the transition model (C2).
#[derive(Debug, Clone, Builder, Getters)]
#[builder(pattern = "owned")]
#[getset(get = "pub")]
pub struct Dataset {
    positions: Vec<f64>,
    lambda: Vec<f64>,
    recom_map: Vec<f64>,
    donor_haps: Vec<Vec<Allele>>,
    recipient_haps: Vec<Vec<Allele>>,
    nhaps_startpop: usize,
    donors: DonorMetadata,
    #[builder(default)]
    unlinked: bool,
}

impl Dataset {
    pub fn n_sites(&self) -> usize {
        self.positions.len()
    }

    pub fn n_donors(&self) -> usize {
        self.donor_haps.len()
    }

    pub fn n_recipient_haps(&self) -> usize {
        self.recipient_haps.len()
    }

    /// Validates the invariants spec §3 demands of a freshly-built
    /// dataset: at least one site, and (when not in all-vs-all mode)
    /// at least one donor haplotype.
    pub fn validate(&self) -> Result<(), Error> {
        if self.n_sites() == 0 {
            return Err(Error::EmptyDataset);
        }
        Ok(())
    }
}

/// The HMM parameter block mutated in place across EM iterations (§3,
/// §4.6). Cloned fresh for every recipient from the dataset-wide
/// starting values.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct HmmParams {
    n_e: f64,
    copy_prob: Vec<f64>,
    copy_prob_start: Vec<f64>,
    mut_rate: Vec<f64>,
}

impl HmmParams {
    pub fn new(n_e: f64, copy_prob: Vec<f64>, copy_prob_start: Vec<f64>, mut_rate: Vec<f64>) -> Self {
        HmmParams {
            n_e,
            copy_prob,
            copy_prob_start,
            mut_rate,
        }
    }

    pub fn set_n_e(&mut self, n_e: f64) {
        self.n_e = n_e;
    }

    pub fn set_copy_prob(&mut self, copy_prob: Vec<f64>) {
        self.copy_prob = copy_prob;
    }

    pub fn set_copy_prob_start(&mut self, copy_prob_start: Vec<f64>) {
        self.copy_prob_start = copy_prob_start;
    }

    pub fn set_mut_rate(&mut self, mut_rate: Vec<f64>) {
        self.mut_rate = mut_rate;
    }

    /// Checks invariant 1/2 from spec §8: both copying distributions sum
    /// to 1 within `1e-9` and every entry is at least `SMALL_COPY_VAL`.
    pub fn copy_prob_is_normalized(&self) -> bool {
        is_normalized(&self.copy_prob) && is_normalized(&self.copy_prob_start)
    }
}

fn is_normalized(probs: &[f64]) -> bool {
    let sum: f64 = probs.iter().sum();
    (sum - 1.0).abs() < 1e-9 && probs.iter().all(|p| *p >= SMALL_COPY_VAL - 1e-18)
}

/// The Li & Stephens theta-based default mutation rate (§4.2): `θ =
/// 1/Σ_{k=1}^{N_chr-1}(1/k)`, `μ = 0.5·θ/(N_donor + θ)`.
pub fn default_mutation_rate(n_donor: usize, n_chr: usize) -> f64 {
    let harmonic: f64 = (1..n_chr).map(|k| 1.0 / k as f64).sum();
    let theta = 1.0 / harmonic;
    0.5 * theta / (n_donor as f64 + theta)
}
