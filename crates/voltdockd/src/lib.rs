//! VoltDock daemon library - exposes modules for testing.

pub mod diag;
pub mod ingest;
pub mod ota;
pub mod power;
pub mod preflight;
pub mod sink;
pub mod source;
pub mod stats;
