//! VoltDock Common - shared types for the dock daemon.
//!
//! Configuration, version comparison, and the external command layer live
//! here so the daemon and its tests share one set of seams.

pub mod config;
pub mod exec;
pub mod version;

pub use config::*;
pub use exec::*;
