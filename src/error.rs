use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while evaluating flags.
///
/// Disabled flags, failed prerequisites and unmatched rules are not errors. They are reported
/// through [`Reason`](crate::Reason) on a successful [`Evaluation`](crate::Evaluation).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The flag store does not know the requested flag.
    #[error("flag not found: {flag_key}")]
    FlagNotFound {
        /// Key of the flag that was requested.
        flag_key: String,
    },

    /// No flag store has been configured for the client.
    #[error("flag store is not configured")]
    ProviderUnavailable,

    /// A flag depends on itself through its prerequisites.
    #[error("cyclic prerequisite: {}", chain.join(" -> "))]
    CyclicPrerequisite {
        /// Flag keys forming the cycle, starting and ending with the same key.
        chain: Vec<String>,
    },

    /// The prerequisite chain is longer than the configured maximum.
    #[error("prerequisite chain for {flag_key} exceeds maximum depth of {max_depth}")]
    PrerequisiteDepthExceeded {
        /// Key of the flag at which the limit was hit.
        flag_key: String,
        /// Configured maximum depth.
        max_depth: usize,
    },

    /// A flag snapshot could not be parsed.
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    #[error("invalid flag set")]
    InvalidFlagSet(#[source] Arc<serde_json::Error>),
}

impl Error {
    /// Return `true` if the error must abort the whole evaluation instead of being absorbed by a
    /// dependent flag as a failed prerequisite.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            Error::CyclicPrerequisite { .. } | Error::PrerequisiteDepthExceeded { .. } => true,

            Error::FlagNotFound { .. } | Error::ProviderUnavailable | Error::InvalidFlagSet(_) => {
                false
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidFlagSet(Arc::new(value))
    }
}
