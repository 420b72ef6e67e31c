//! The HMM engine: numeric kernels, the copying-model transition and
//! emission distributions, the forward/backward recurrences, the
//! posterior sampler, and the per-recipient EM driver.

pub mod backward;
pub mod dataset;
pub mod em;
pub mod emission;
pub mod forward;
pub mod numeric;
pub mod sampler;
pub mod transition;
