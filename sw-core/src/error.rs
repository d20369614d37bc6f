//! Error types for gateway calls and catalogue validation.

use thiserror::Error;

/// Failure modes of the external satellite, weather and image services.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Client id or secret absent from the environment
    #[error("Copernicus client id or secret not configured")]
    MissingCredentials,

    /// The token endpoint refused the credentials or was unreachable
    #[error("Failed to obtain access token: {0}")]
    Auth(String),

    /// HTTP request failed before a response arrived
    #[cfg(feature = "api")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered but had nothing for the request
    #[error("No data found for request")]
    NoData,

    /// The response body could not be decoded
    #[error("Failed to decode gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Auth failures end the current pipeline run; everything else
    /// degrades to "no new data this cycle".
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::MissingCredentials | GatewayError::Auth(_))
    }
}

/// Static project/station configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Unknown project: {0}")]
    UnknownProject(String),

    #[error("Unknown station: {0}")]
    UnknownStation(String),

    #[error("Project {0} has no stations")]
    NoStations(String),

    #[error("Invalid grid for {point}: {reason}")]
    InvalidGrid { point: String, reason: String },

    #[error("Invalid station catalogue: {0}")]
    InvalidCatalogue(String),
}
