//! Rubric scoring and assignment-form validation for the FASM front end.
//!
//! The `fasmd` binary exposes these over a JSON-lines sidecar protocol; the
//! modules are also usable in-process.

pub mod calc;
pub mod ipc;
pub mod logging;
pub mod params;
pub mod policy;
pub mod schedule;
