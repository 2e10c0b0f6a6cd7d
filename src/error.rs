//! Error types for reactor construction.
//!
//! Registration and polling failures never surface as errors: the
//! registration calls report a boolean per their contract, and wait
//! failures degrade to an empty cycle. The only fallible surface is
//! building a poller backend in the first place.

use std::io;

use thiserror::Error;

use crate::poller::PollerKind;

/// Failure to construct a poller backend.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PollerError {
    /// The requested facility exists on this platform but could not be
    /// initialized.
    #[error("failed to create {backend} poller: {source}")]
    Creation {
        /// Facility that failed to come up.
        backend: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The requested facility is not compiled in for this platform.
    #[error("poller backend {kind:?} is not supported on this platform")]
    Unsupported {
        /// The facility that was asked for.
        kind: PollerKind,
    },

    /// Probing exhausted every compiled-in facility.
    #[error("no poller backend available on this platform")]
    Exhausted,
}
