/// Errors raised by the remote metric sinks.
///
/// # Examples
///
/// ```rust
/// use metal_publisher::error::PublishError;
///
/// let err = PublishError::Credentials("AWS_ACCESS_KEY_ID is not set".to_string());
/// assert!(err.to_string().contains("AWS_ACCESS_KEY_ID"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Sink configuration is missing a required field or contains an invalid value.
    #[error("Publish: invalid configuration: {0}")]
    InvalidConfig(String),

    /// No usable credentials were configured or found in the environment.
    #[error("Publish: missing credentials: {0}")]
    Credentials(String),

    /// HMAC signing failed.
    #[error("Publish: request signing failed: {0}")]
    Signing(String),

    /// The HTTP transport failed before a response arrived.
    #[error("Publish: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    #[error("Publish: API error from {service}: status={status}, body={body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for sink operations.
pub type Result<T> = std::result::Result<T, PublishError>;
