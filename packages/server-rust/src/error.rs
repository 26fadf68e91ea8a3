//! Service-boundary error taxonomy.
//!
//! Everything the orchestrators can surface to a caller, with the HTTP
//! status each kind maps to when a transport layer sits on top. Internal
//! errors keep their full chain for logging but surface only a fixed
//! user-safe message.

use uuid::Uuid;

/// Errors surfaced by the import / dedup / overlap services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The per-project advisory lock is held by another job.
    #[error("another job is running for this project, please wait and retry")]
    ProjectLocked,

    #[error("strategy {0} not found")]
    StrategyNotFound(Uuid),

    #[error("cluster {0} not found")]
    ClusterNotFound(Uuid),

    #[error("source {0} not found")]
    SourceNotFound(Uuid),

    #[error("record source {record_source_id} not found in cluster {cluster_id}")]
    MemberNotFound {
        cluster_id: Uuid,
        record_source_id: Uuid,
    },

    /// Caller error on manual linking (fewer than two records, …).
    #[error("invalid manual link request: {0}")]
    InvalidManualLink(String),

    #[error("only user-added members can be removed")]
    MemberNotRemovable,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// HTTP status code an edge layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ProjectLocked => 409,
            Self::StrategyNotFound(_)
            | Self::ClusterNotFound(_)
            | Self::SourceNotFound(_)
            | Self::MemberNotFound { .. } => 404,
            Self::InvalidManualLink(_) | Self::MemberNotRemovable => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to show a user. Internal details are logged, never
    /// surfaced.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Internal(_) => {
                "Database error during the operation. Please retry or contact support."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_contract() {
        assert_eq!(ServiceError::ProjectLocked.status_code(), 409);
        assert_eq!(ServiceError::StrategyNotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(
            ServiceError::InvalidManualLink("too few".to_string()).status_code(),
            400
        );
        assert_eq!(
            ServiceError::Internal(anyhow::anyhow!("pg down")).status_code(),
            500
        );
    }

    #[test]
    fn internal_errors_are_not_leaked_to_users() {
        let err = ServiceError::Internal(anyhow::anyhow!("connection refused at 10.0.0.3"));
        assert!(!err.user_message().contains("10.0.0.3"));
        // The raw chain stays available for logging.
        assert!(format!("{err}").contains("connection refused"));
    }
}
