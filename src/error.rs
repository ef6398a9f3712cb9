//! Crate-level error types for commands, the network collaborator, and the
//! dispatch engine.

/// Failure reported by a network collaborator.
///
/// Stores convert this into a plain message string (see
/// [`ApiError::message`]) and record it in their `error` field. It never
/// escapes a store as anything richer than that string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transport failure: no HTTP response was received.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status or `success: false`.
    #[error("server error: {message}")]
    Server {
        /// HTTP status code, when the failure came with one.
        status: Option<u16>,
        /// Server-provided rejection message.
        message: String,
    },

    /// The response arrived but its body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build a [`ApiError::Server`] without a status code.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            status: None,
            message: message.into(),
        }
    }

    /// The plain message written into a store's `error` field.
    ///
    /// Server rejections surface their message verbatim so the collaborator
    /// can show exactly what the service said.
    pub fn message(&self) -> String {
        match self {
            Self::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Client-side field check failure, raised before any network dispatch.
///
/// Never written to a store's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// An entity identifier was empty or blank.
    #[error("{0} must not be empty")]
    EmptyId(&'static str),

    /// A monetary amount was zero.
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    /// A dispute was submitted without a reason.
    #[error("dispute reason must not be empty")]
    EmptyReason,

    /// The ticket already carries a non-rejected dispute.
    #[error("ticket {ticket_id} already has an active dispute")]
    DisputeAlreadyActive {
        /// Ticket the dispute was submitted for.
        ticket_id: String,
    },

    /// Page numbers start at 1 and page sizes must be within bounds.
    #[error("invalid page request: page {page}, page size {page_size}")]
    InvalidPage {
        /// Requested page.
        page: u32,
        /// Requested page size.
        page_size: u32,
    },

    /// Card expiry month outside 1..=12.
    #[error("card expiry month {0} is out of range")]
    InvalidExpiry(u8),

    /// The masked card summary must end in exactly four digits.
    #[error("card last four must be exactly 4 digits")]
    InvalidCardSummary,

    /// A required text field was empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Error returned by every command on [`SyncHandle`](crate::SyncHandle).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Rejected at the command boundary; nothing was dispatched.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The network collaborator failed. The same message is recorded in the
    /// owning store's `error` field.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The owning store refused to start the operation.
    #[error("{0} was not admitted")]
    NotAdmitted(&'static str),

    /// The dispatch actor is no longer running.
    #[error("sync engine is no longer running")]
    EngineGone,
}

/// Error returned when configuring or starting the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A network collaborator was not registered on the builder.
    #[error("no {0} API registered")]
    MissingApi(&'static str),

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL is not an absolute http(s) URL.
    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String),

    /// The persisted token could not be read.
    #[error("token store I/O error: {0}")]
    TokenStore(#[from] std::io::Error),

    /// `spawn` was called outside a tokio runtime.
    #[error("no tokio runtime is running")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_surfaced_verbatim() {
        let err = ApiError::Server {
            status: Some(409),
            message: "Ticket is under dispute".into(),
        };
        assert_eq!(err.message(), "Ticket is under dispute");
        assert_eq!(err.to_string(), "server error: Ticket is under dispute");
    }

    #[test]
    fn network_message_keeps_category_prefix() {
        let err = ApiError::Network("connection reset".into());
        assert_eq!(err.message(), "network error: connection reset");
    }

    #[test]
    fn command_error_validation_is_transparent() {
        let err = CommandError::from(ValidationError::EmptyReason);
        assert_eq!(err.to_string(), "dispute reason must not be empty");
    }

    #[test]
    fn command_error_api_from_conversion() {
        let err: CommandError = ApiError::server("declined").into();
        assert!(matches!(err, CommandError::Api(ApiError::Server { .. })));
    }

    #[test]
    fn engine_error_missing_api_display() {
        let err = EngineError::MissingApi("ticket");
        assert_eq!(err.to_string(), "no ticket API registered");
    }

    // Errors travel through tokio channels and across tasks.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<ApiError>();
            assert_send_sync::<CommandError>();
            assert_send_sync::<EngineError>();
        }
    };
}
