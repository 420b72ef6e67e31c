//! C3: per-site match/mismatch emission probability (§4.2).

use crate::core::dataset::Allele;

/// `emit(h, i) = (1 - mut_rate[h])` if `recipient[i] == donor[h][i]`,
/// else `mut_rate[h]`. Holds borrowed references to one recipient
/// haplotype, the donor panel, and the per-donor mutation rates so the
/// forward/backward passes can query it by `(donor, site)` without
/// re-threading all three through every call site.
pub struct EmissionModel<'a> {
    recipient_hap: &'a [Allele],
    donor_haps: &'a [Vec<Allele>],
    mut_rate: &'a [f64],
}

impl<'a> EmissionModel<'a> {
    pub fn new(recipient_hap: &'a [Allele], donor_haps: &'a [Vec<Allele>], mut_rate: &'a [f64]) -> Self {
        EmissionModel {
            recipient_hap,
            donor_haps,
            mut_rate,
        }
    }

    #[inline]
    pub fn prob(&self, donor: usize, site: usize) -> f64 {
        if self.recipient_hap[site] == self.donor_haps[donor][site] {
            1.0 - self.mut_rate[donor]
        } else {
            self.mut_rate[donor]
        }
    }

    #[inline]
    pub fn mismatches(&self, donor: usize, site: usize) -> bool {
        self.recipient_hap[site] != self.donor_haps[donor][site]
    }
}
