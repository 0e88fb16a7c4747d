//! Filter and resampler parameter derivation
//!
//! The runtime executes the filters; this module only computes what they
//! are configured with.

pub mod firdes;
mod resampler;

pub use firdes::{low_pass, Window, KAISER_BETA};
pub use resampler::{ResamplerDesign, FRACTIONAL_BW};
