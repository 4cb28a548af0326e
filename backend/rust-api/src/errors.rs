use thiserror::Error;

/// Failures surfaced by the metrics core.
///
/// Missing data is not an error: engines report `sample_size == 0` with an
/// undefined score instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("invalid learner identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("unknown timezone: {0:?}")]
    InvalidTimezone(String),
    #[error("learner not found: {0}")]
    NotFound(String),
    #[error("attempt source unavailable: {0}")]
    SourceUnavailable(String),
}

impl MetricsError {
    pub fn label(&self) -> &'static str {
        match self {
            MetricsError::InvalidIdentifier(_) => "invalid_identifier",
            MetricsError::InvalidTimezone(_) => "invalid_timezone",
            MetricsError::NotFound(_) => "not_found",
            MetricsError::SourceUnavailable(_) => "source_unavailable",
        }
    }
}

/// Failures an attempt source may report.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("learner {0} does not exist")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<SourceError> for MetricsError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(id) => MetricsError::NotFound(id),
            SourceError::Unavailable(reason) => MetricsError::SourceUnavailable(reason),
        }
    }
}

impl From<mongodb::error::Error> for SourceError {
    fn from(err: mongodb::error::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}
