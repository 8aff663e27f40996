// THEORY:
// This file is the main entry point for the `ledge_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the
// public API that will be exposed to external consumers (a game loop, a
// camera daemon, or the bundled demo binary).
//
// The primary goal is to export the `TrackingPipeline` and its associated
// data structures (`PipelineConfig`, `FrameReport`, `TargetEvent`, etc.) as
// the clean, high-level interface for the whole tracking engine. The
// internal analysis stages (`core_modules`) stay public for callers that
// want to drive a single estimator or detector directly, but the pipeline
// is the supported surface.

pub mod config;
pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;
