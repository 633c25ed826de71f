//! Shared building blocks: vector arrays, identities, errors, numeric helpers and diagnostics.

pub(crate) mod core;
pub(crate) mod diag;
pub(crate) mod error;
pub(crate) mod fingerprint;
pub(crate) mod math;
