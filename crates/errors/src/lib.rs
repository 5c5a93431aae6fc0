//! Error classification for the relay backend.
//!
//! An [`ErrorMetadata`] can be attached to an `anyhow` error chain via
//! `.context(e)`. It tags the error with a code used for transport-level
//! classification, a `short_msg` that is stable across copy changes (usable
//! in tests and metrics), and a developer-facing `msg`.

use std::borrow::Cow;

use http::StatusCode;

mod metrics;

use crate::metrics::log_error_reported;

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{msg}")]
pub struct ErrorMetadata {
    pub code: ErrorCode,
    /// Short ScreamingCamelCase tag, e.g. `ClientEpochAlreadyInitialized`.
    pub short_msg: Cow<'static, str>,
    /// Human readable, developer facing description.
    pub msg: Cow<'static, str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Unauthenticated,
    NotFound,
    Overloaded,
}

impl ErrorMetadata {
    /// Bad request. Maps to 400 in HTTP.
    pub fn bad_request(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    /// Not authenticated. Maps to 401 in HTTP.
    pub fn unauthenticated(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Unauthenticated,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    /// Resource not found. Maps to 404 in HTTP.
    pub fn not_found(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::NotFound,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    /// The service is temporarily overloaded. Maps to 503 in HTTP.
    pub fn overloaded(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Overloaded,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self.code {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Client-caused errors are logged at warn and not counted as server
    /// faults.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::BadRequest | ErrorCode::Unauthenticated | ErrorCode::NotFound
        )
    }
}

/// Helpers for reading `ErrorMetadata` back out of an `anyhow` chain.
pub trait ErrorMetadataAnyhowExt {
    fn error_metadata(&self) -> Option<&ErrorMetadata>;

    fn short_msg(&self) -> Option<&str> {
        self.error_metadata().map(|em| &*em.short_msg)
    }

    fn is_bad_request(&self) -> bool {
        self.error_metadata()
            .is_some_and(|em| em.code == ErrorCode::BadRequest)
    }

    fn is_unauthenticated(&self) -> bool {
        self.error_metadata()
            .is_some_and(|em| em.code == ErrorCode::Unauthenticated)
    }
}

impl ErrorMetadataAnyhowExt for anyhow::Error {
    fn error_metadata(&self) -> Option<&ErrorMetadata> {
        self.downcast_ref::<ErrorMetadata>()
    }
}

/// Log an error that is not being propagated further. Client-fault errors
/// log at warn; everything else logs at error and bumps the reported-error
/// counter.
pub fn report_error(err: &anyhow::Error) {
    let client_fault = err
        .error_metadata()
        .is_some_and(ErrorMetadata::is_client_fault);
    if client_fault {
        tracing::warn!("Caught client error: {err:#}");
    } else {
        tracing::error!("Caught server error: {err:#}");
        log_error_reported(err.short_msg().unwrap_or("InternalServerError"));
    }
    tracing::debug!("{err:?}");
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::{
        ErrorMetadata,
        ErrorMetadataAnyhowExt,
    };

    #[test]
    fn test_metadata_survives_anyhow_chain() {
        let err = anyhow::anyhow!("root cause")
            .context(ErrorMetadata::bad_request("BadPush", "push body was malformed"));
        assert!(err.is_bad_request());
        assert_eq!(err.short_msg(), Some("BadPush"));
        assert_eq!(
            err.error_metadata().unwrap().http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_unauthenticated_classification() {
        let err: anyhow::Error =
            ErrorMetadata::unauthenticated("MissingBearer", "no bearer token").into();
        assert!(err.is_unauthenticated());
        assert!(!err.is_bad_request());
    }
}
