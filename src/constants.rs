// Copying-model constants shared by the EM driver, the backward pass, and
// the option validator. Mirrors the handful of magic numbers the original
// ChromoPainterMutEM implementation hard-codes (see DESIGN.md).

/// Floor below which a per-hap copying proportion is never allowed to
/// drop during EM, even if the M-step would otherwise push it to zero.
pub const SMALL_COPY_VAL: f64 = 1e-15;

/// Floor for non-negative recombination-map rates; values below this are
/// treated as if they were exactly this small, not zero.
pub const MIN_RECOM_RATE: f64 = 1e-15;

/// Default number of expected chunks per region used for the regional
/// chunk-count / squared-chunk-count accumulators (`-k`).
pub const DEFAULT_REGION_SIZE: f64 = 100.0;

/// Default number of posterior samples drawn per recipient haplotype (`-s`).
pub const DEFAULT_NSAMPLES: usize = 10;

/// `delta`: a map-rescaling constant carried from the reference
/// implementation. It is always 1.0 in the current design; retained as a
/// named constant (rather than inlined) so a future map-rescaling
/// experiment has a single place to change it (spec Open Question).
pub const DELTA: f64 = 1.0;

/// Starting `N_e` default is `400000 / total_haps` when `-n` is not given.
pub const DEFAULT_NE_NUMERATOR: f64 = 400_000.0;
