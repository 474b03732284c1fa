//! Unified error handling for bazaar-chatd.
//!
//! Every failure in the routing core is per-event: it is logged, counted, and
//! the triggering event is dropped. Nothing here is fatal to the process.

use crate::store::StoreError;
use thiserror::Error;

/// Credential verification failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential rejected: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),

    /// The token verified but carries neither a customer nor a vendor id.
    #[error("claim carries no customer or vendor id")]
    MissingRoleId,
}

/// Errors that can occur while routing a message.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] AuthError),

    #[error("malformed target id: {0:?}")]
    MalformedTarget(String),

    #[error("persistence handoff failed: {0}")]
    Store(#[from] StoreError),
}

impl RouteError {
    /// Static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredential(_) => "invalid_credential",
            Self::MalformedTarget(_) => "malformed_target",
            Self::Store(_) => "store_error",
        }
    }
}
