#![forbid(unsafe_code)]

//! Location of a small CBLAS Level-2 shared object built from
//! `cdylib/fixture_cblas.rs` by this crate's build script.
//!
//! The object exports the 22 routines the harness binds (s/d/c/z gemv, gbmv,
//! trmv and trsv, s/d symv, c/z hemv, s/d ger), computed with plain loops. It
//! accepts only what a row-major, unit-stride caller passes and aborts on
//! anything else, so a mangled call boundary cannot pass silently.
//! `cblas_dgemv` can be told to misbehave through [`FAULT_ENV`].

use std::path::Path;

/// Read by `cblas_dgemv` on every call.
pub const FAULT_ENV: &str = "BL2_FIXTURE_FAULT";

/// Writes to an unmapped address.
pub const FAULT_SEGV: &str = "segv_dgemv";
/// Returns without touching `y`.
pub const FAULT_STALE: &str = "stale_dgemv";
/// Passes the result through one process-wide scratch buffer, so
/// overlapping callers corrupt each other.
pub const FAULT_RACY: &str = "racy_dgemv";

#[must_use]
pub fn library_path() -> &'static Path {
    Path::new(env!("BL2_FIXTURE_CBLAS"))
}
