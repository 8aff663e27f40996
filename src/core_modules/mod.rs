// The per-pixel analysis stages and the target state machine. Everything in
// here is synchronous and total; orchestration and frame ordering live in
// the `pipeline` module.

pub mod edge_detector;
pub mod edge_segment;
pub mod luma;
pub mod motion;
pub mod spawn;
#[cfg(feature = "phase-correlation")]
pub mod spectral;
pub mod target_lock;
pub mod utils;
pub mod verifier;
