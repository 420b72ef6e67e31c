//! External collaborators (§6): genotype/recomb-map/donor-list parsing
//! and output formatting. None of this is part of the HMM engine; it
//! only feeds `Dataset`/`DonorMetadata` in and writes `RecipientEmOutput`
//! back out.

pub mod donor_list;
pub mod genotype;
pub mod recomb_map;
pub mod writers;
