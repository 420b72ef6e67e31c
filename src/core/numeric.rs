//! C1: shared numeric kernels — log-sum-exp, safe log/exp conversions, and
//! the uniform-draw / categorical-sampling helpers used by the sampler
//! (C6) and by the forward/backward recurrences (C4/C5).
//!
//! `bio::stats::LogProb` is the teacher's log-space vocabulary
//! (`model/sample.rs`, `model/modes/generic.rs`); every α/β/γ/ξ value in
//! this crate is a `LogProb` so that `LogProb::ln_sum_exp` — which
//! subtracts the running maximum before exponentiating — is the *only*
//! place exponentiation of a possibly-large-magnitude log value happens.

use bio::stats::{LogProb, Prob};
use rand::Rng;

/// Converts a plain probability in `[0, 1]` to log-space. Kept as a named
/// helper (rather than calling `LogProb::from(Prob(..))` everywhere) so
/// call sites read as "enter log-space" rather than a bare type
/// conversion.
#[inline]
pub fn ln(p: f64) -> LogProb {
    LogProb::from(Prob(p))
}

/// log-sum-exp over a slice of log-values, via the shared
/// max-subtraction implementation in `bio::stats::LogProb`. Every
/// forward/backward/sampler reduction over donor haplotypes goes through
/// this one function (spec §9: "a single utility must be shared by
/// forward, backward, sampler, and accumulators").
#[inline]
pub fn log_sum_exp(values: &[LogProb]) -> LogProb {
    LogProb::ln_sum_exp(values)
}

/// Draws `u ~ Uniform(0, 1)`.
#[inline]
pub fn draw_uniform(rng: &mut impl Rng) -> f64 {
    rng.gen::<f64>()
}

/// Samples a category from an unnormalized vector of log-weights, using
/// the max-subtraction trick so that neither the normalizer nor the
/// cumulative sum ever exponentiates a large-magnitude log value
/// directly (spec §4.5: "All categorical draws use the max-subtraction
/// trick").
pub fn sample_categorical(log_weights: &[LogProb], rng: &mut impl Rng) -> usize {
    debug_assert!(!log_weights.is_empty());
    let max = log_weights.iter().map(|w| **w).fold(f64::NEG_INFINITY, f64::max);
    let shifted: Vec<f64> = log_weights.iter().map(|w| (**w - max).exp()).collect();
    let total: f64 = shifted.iter().sum();
    let draw = draw_uniform(rng) * total;
    let mut cumulative = 0.0;
    for (idx, weight) in shifted.iter().enumerate() {
        cumulative += weight;
        if draw <= cumulative {
            return idx;
        }
    }
    shifted.len() - 1
}

/// True when a log-likelihood is unusable: NaN, or `-inf` where a finite
/// value was expected. Every forward pass and accumulation step that
/// could divide by zero or take `ln(0)` checks its result through this
/// function and raises `Error::NumericalUnderflow` rather than
/// propagating a poisoned value (spec §4.3, §7).
#[inline]
pub fn is_numerically_unusable(log_likelihood: LogProb) -> bool {
    let x: f64 = *log_likelihood;
    x.is_nan() || x == f64::NEG_INFINITY
}
