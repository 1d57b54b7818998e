//! Composable, non-mutating preprocessing transforms over recording views.

pub mod bandpass;
pub mod common_reference;
pub mod node;
pub mod scale;

pub use bandpass::{BandpassFilter, BandpassParams};
pub use common_reference::{CommonReference, ReferenceMode};
pub use scale::{ScaleParams, ScaleTraces};
