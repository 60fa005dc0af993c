use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration missing: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid schedule expression `{expression}`: {reason}")]
    ScheduleInvalid { expression: String, reason: String },

    #[error("Upstream transport error: {message}")]
    UpstreamTransport {
        status: Option<u16>,
        body: Option<String>,
        message: String,
    },

    #[error("Upstream reported a non-success payload: {payload}")]
    UpstreamData { payload: serde_json::Value },

    #[error("An ingestion run is already in progress")]
    AlreadyRunning,

    #[error("Store write error: {0}")]
    StoreWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::UpstreamTransport {
            status: err.status().map(|s| s.as_u16()),
            body: None,
            message: err.to_string(),
        }
    }
}

impl Error {
    /// Transport and store failures end a run; everything else is handled
    /// where it happens.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Error::UpstreamTransport { .. } | Error::StoreWrite(_) | Error::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_error_message() {
        let err = Error::UpstreamTransport {
            status: Some(502),
            body: Some("bad gateway".to_string()),
            message: "HTTP 502 from upstream".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream transport error: HTTP 502 from upstream");
        assert!(err.is_fatal_to_run());
    }

    #[test]
    fn test_data_errors_are_not_fatal() {
        let err = Error::UpstreamData {
            payload: json!({ "status": "error" }),
        };
        assert!(!err.is_fatal_to_run());
        assert!(!Error::AlreadyRunning.is_fatal_to_run());
        assert!(!Error::ConfigMissing("api key").is_fatal_to_run());
    }
}
