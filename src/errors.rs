use std::path::PathBuf;

use thiserror::Error;

/// The four fatal error kinds from the spec: malformed input, disallowed
/// option combinations, numerical breakdown of the HMM recursions, and
/// I/O failures. Every fatal condition in the program resolves to one of
/// these variants; there is no local recovery (see spec §7).
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("malformed genotype file {path}: expected {expected} alleles on line {line}, found {found}")]
    WrongLineLength {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("invalid allele {allele:?} at site {site} of haplotype {hap} in {path}")]
    InvalidAllele {
        path: PathBuf,
        hap: usize,
        site: usize,
        allele: char,
    },
    #[error("positions are not strictly increasing at site {site} ({prev} >= {next}) and jitter is disabled")]
    NonMonotonePositions { site: usize, prev: f64, next: f64 },
    #[error("donor-list counts sum to {found}, expected {expected}")]
    DonorCountMismatch { found: usize, expected: usize },
    #[error("prior copying probabilities sum to {sum}, expected {expected}")]
    InvalidPriorSum { sum: f64, expected: String },
    #[error("mutation rate {value} for donor {hap} is out of range [0, 1]")]
    InvalidMutationRate { hap: usize, value: f64 },
    #[error("recombination map basepair {found} at row {row} does not match genotype position {expected}")]
    RecombMapMismatch { row: usize, expected: f64, found: f64 },
    #[error("dataset has zero sites")]
    EmptyDataset,

    #[error("exactly one of -m/-M must be given for the mutation rate")]
    MutationFlagsExclusive,
    #[error("at most one of -im/-iM may be given")]
    EmMutationFlagsExclusive,
    #[error("-a and -c are mutually exclusive")]
    AllVsAllAndConditioningExclusive,
    #[error("-i (EM iterations) > 0 requires at least one of -in/-ip/-im/-iM")]
    NoEmTargetSelected,
    #[error("nhaps_startpop = 0 is only valid together with -a")]
    ZeroDonorsWithoutAllVsAll,
    #[error("all-vs-all mode (-a) requires nhaps_startpop = 0")]
    AllVsAllRequiresZeroDonors,
    #[error("donor-list haplotype counts sum to {found}, which matches neither nhaps_startpop ({nhaps_startpop}) nor the total haplotype count ({total_haps})")]
    DonorListCountMismatch {
        found: usize,
        nhaps_startpop: usize,
        total_haps: usize,
    },
    #[error("priors must sum to 1 in donor mode (found {found})")]
    PriorsMustSumToOne { found: f64 },
    #[error("priors must sum to strictly less than 1 in recipient-conditioning mode (found {found})")]
    PriorsMustSumBelowOne { found: f64 },

    #[error("numerical underflow: {context} produced a non-finite log-likelihood")]
    NumericalUnderflow { context: &'static str },

    #[error("could not open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },
}

/// `std::io::Error` does not implement `PartialEq`, so `Error` carries a
/// lightweight, comparable stand-in for it (the message text) to keep
/// the `Error` enum `PartialEq`-derivable for unit tests.
#[derive(Debug, Clone)]
pub struct IoErrorKind(pub String);

impl PartialEq for IoErrorKind {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoErrorKind {}

impl From<std::io::Error> for IoErrorKind {
    fn from(e: std::io::Error) -> Self {
        IoErrorKind(e.to_string())
    }
}
