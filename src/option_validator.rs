//! C10: fatal validation of flag combinations and input-sized
//! consistency (§4.8). Runs once at startup, before any file is parsed
//! beyond what's needed to know haplotype counts.

use crate::cli::Opt;
use crate::errors::Error;

/// Checks every flag-combination rule from §4.8. Counts-based checks
/// (donor-list totals, prior sums) run later once the files are
/// actually parsed, since they need the parsed values.
pub fn validate_flags(opt: &Opt) -> Result<(), Error> {
    if opt.donor_mut_rate_self.is_some() == opt.global_mut_rate.is_some() {
        return Err(Error::MutationFlagsExclusive);
    }

    if opt.maximize_mut_rate_per_pop && opt.maximize_mut_rate_global {
        return Err(Error::EmMutationFlagsExclusive);
    }

    if opt.all_vs_all.is_some() && opt.conditioning {
        return Err(Error::AllVsAllAndConditioningExclusive);
    }

    if opt.em_iters > 0
        && !(opt.maximize_n_e || opt.maximize_copy_prob || opt.maximize_mut_rate_per_pop || opt.maximize_mut_rate_global)
    {
        return Err(Error::NoEmTargetSelected);
    }

    if !opt.recomb_map.is_some() && !opt.unlinked {
        return Err(Error::RecombMapMismatch { row: 0, expected: 0.0, found: 0.0 });
    }

    if opt.donor_list.is_none() && opt.all_vs_all.is_none() {
        return Err(Error::DonorCountMismatch { found: 0, expected: 0 });
    }

    Ok(())
}

/// §4.8: `nhaps_startpop = 0` is only valid together with `-a`; all-vs-all
/// mode requires `nhaps_startpop = 0`.
pub fn validate_donor_count(nhaps_startpop: usize, all_vs_all: bool) -> Result<(), Error> {
    match (nhaps_startpop, all_vs_all) {
        (0, false) => Err(Error::ZeroDonorsWithoutAllVsAll),
        (n, true) if n != 0 => Err(Error::AllVsAllRequiresZeroDonors),
        _ => Ok(()),
    }
}

/// §4.8: donor-list haplotype counts must sum to either `nhaps_startpop`
/// (donor mode) or the total haplotype count (all-vs-all label mode).
pub fn validate_donor_list_total(found: usize, nhaps_startpop: usize, total_haps: usize) -> Result<(), Error> {
    if found == nhaps_startpop || found == total_haps {
        Ok(())
    } else {
        Err(Error::DonorListCountMismatch { found, nhaps_startpop, total_haps })
    }
}

/// §4.8: priors sum to 1 exactly in donor mode, or strictly below 1 in
/// recipient-conditioning mode (the remainder is the "self" population).
pub fn validate_prior_sum(priors: &[f64], recipient_conditioning: bool) -> Result<(), Error> {
    let sum: f64 = priors.iter().sum();
    if recipient_conditioning {
        if sum >= 1.0 {
            return Err(Error::PriorsMustSumBelowOne { found: sum });
        }
    } else if (sum - 1.0).abs() > 1e-9 {
        return Err(Error::PriorsMustSumToOne { found: sum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_donors_without_all_vs_all() {
        assert!(matches!(validate_donor_count(0, false), Err(Error::ZeroDonorsWithoutAllVsAll)));
        assert!(validate_donor_count(0, true).is_ok());
    }

    #[test]
    fn rejects_all_vs_all_with_nonzero_donors() {
        assert!(matches!(validate_donor_count(3, true), Err(Error::AllVsAllRequiresZeroDonors)));
    }

    #[test]
    fn prior_sum_must_be_exactly_one_in_donor_mode() {
        assert!(validate_prior_sum(&[0.5, 0.5], false).is_ok());
        assert!(validate_prior_sum(&[0.4, 0.5], false).is_err());
    }

    #[test]
    fn prior_sum_must_be_below_one_in_conditioning_mode() {
        assert!(validate_prior_sum(&[0.4, 0.5], true).is_ok());
        assert!(validate_prior_sum(&[0.5, 0.5], true).is_err());
    }
}
