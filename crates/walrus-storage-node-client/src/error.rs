// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Errors that may be encountered while interacting with a storage node.

use reqwest::StatusCode;

/// Error raised during communication with a node.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct NodeError {
    #[from]
    kind: Kind,
}

impl NodeError {
    /// Returns the HTTP error status code associated with the error, if any.
    pub fn http_status_code(&self) -> Option<StatusCode> {
        match &self.kind {
            Kind::Reqwest(inner) => inner.status(),
            Kind::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the node authoritatively replied that it does not store the requested
    /// object ([`StatusCode::NOT_FOUND`]).
    pub fn is_status_not_found(&self) -> bool {
        self.http_status_code() == Some(StatusCode::NOT_FOUND)
    }

    /// Returns true if the node refuses to serve the object for legal reasons
    /// ([`StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS`]).
    pub fn is_legally_unavailable(&self) -> bool {
        self.http_status_code() == Some(StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS)
    }

    /// Returns true if the request was aborted through an external cancellation signal.
    pub fn is_user_abort(&self) -> bool {
        matches!(self.kind, Kind::Canceled)
    }

    /// Creates a [`NodeError`] representing an externally canceled request.
    pub fn canceled() -> Self {
        Kind::Canceled.into()
    }

    /// Creates a [`NodeError`] from an arbitrary error raised while processing a response.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Kind::Other(err.into()).into()
    }

    pub(crate) fn reqwest(err: reqwest::Error) -> Self {
        Kind::Reqwest(err).into()
    }

    pub(crate) fn status(code: StatusCode, message: String) -> Self {
        Kind::Status { code, message }.into()
    }
}

/// Errors returned during the communication with a storage node.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Kind {
    #[error("failed to decode the response body as BCS")]
    Bcs(#[from] bcs::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("the node returned status {code}: {message}")]
    Status { code: StatusCode, message: String },
    #[error("the request was canceled")]
    Canceled,
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// An error returned when building a [`StorageNodeClient`][crate::StorageNodeClient] has failed.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ClientBuildError {
    #[from]
    kind: BuildErrorKind,
}

impl ClientBuildError {
    pub(crate) fn reqwest(err: reqwest::Error) -> Self {
        BuildErrorKind::Reqwest(err).into()
    }

    pub(crate) fn invalid_authority() -> Self {
        BuildErrorKind::InvalidHostOrPort.into()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BuildErrorKind {
    #[error("invalid storage node authority")]
    InvalidHostOrPort,
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}
