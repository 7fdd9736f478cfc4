use std::error::Error as StdError;
use std::fmt;

/// Status codes that mark a request as permanently rejected.
pub const NON_RETRIABLE_STATUSES: [u16; 3] = [401, 403, 422];

/// Failures surfaced by the delivery pipeline.
///
/// Callers of a provider only ever observe `Cancelled` or `Api`;
/// `Validation` is raised before anything reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The exchange was stopped through its cancellation token.
    Cancelled,

    /// Transport failure, non-2xx status, or an unusable payload.
    Api {
        message: String,
        /// HTTP status when the failure came from a response.
        status: Option<u16>,
    },

    /// Missing or empty configuration, such as an absent credential.
    Validation(String),
}

impl DeliveryError {
    pub fn api(message: impl Into<String>) -> Self {
        DeliveryError::Api {
            message: message.into(),
            status: None,
        }
    }

    pub fn api_status(message: impl Into<String>, status: u16) -> Self {
        DeliveryError::Api {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn invalid_response() -> Self {
        Self::api("invalid response format")
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            DeliveryError::Cancelled | DeliveryError::Validation(_) => false,
            DeliveryError::Api { status, .. } => {
                !status.is_some_and(|code| NON_RETRIABLE_STATUSES.contains(&code))
            }
        }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Cancelled => write!(f, "request cancelled"),
            DeliveryError::Api {
                message,
                status: Some(status),
            } => write!(f, "API error ({status}): {message}"),
            DeliveryError::Api {
                message,
                status: None,
            } => write!(f, "API error: {message}"),
            DeliveryError::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl StdError for DeliveryError {}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => DeliveryError::api_status(err.to_string(), status.as_u16()),
            None => DeliveryError::api(err.to_string()),
        }
    }
}
