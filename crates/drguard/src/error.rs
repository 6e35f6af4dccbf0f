//! Error taxonomy for the reconciler.
//!
//! NotFound and TimedOut are modeled as values on the client surface
//! (`GetOutcome`, `WaitOutcome`), not errors. What remains here splits into
//! transient conditions, which the attempt loop retries like any other failed
//! check, and terminal conditions (permission, configuration) that abort the
//! run immediately with an actionable diagnostic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transient API error: {0}")]
    Transient(String),

    #[error("permission denied: {0} (verify RBAC bindings and the credentials for this target)")]
    PermissionDenied(String),

    #[error("credential resolution failed for target '{target}': {reason}")]
    CredentialResolution { target: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether this error should abort the run instead of being retried.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::PermissionDenied(_) | ClientError::Config(_)
        )
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 401 || ae.code == 403 => {
                ClientError::PermissionDenied(ae.message.clone())
            }
            _ => ClientError::Transient(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_and_config_errors_are_terminal() {
        assert!(ClientError::PermissionDenied("forbidden".into()).is_terminal());
        assert!(ClientError::Config("bad retry policy".into()).is_terminal());
        assert!(!ClientError::Transient("connection reset".into()).is_terminal());
        assert!(!ClientError::CredentialResolution {
            target: "dr1".into(),
            reason: "secret missing".into(),
        }
        .is_terminal());
    }

    #[test]
    fn kube_api_errors_classify_by_status_code() {
        let forbidden = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "secrets is forbidden".into(),
            reason: "Forbidden".into(),
            code: 403,
        });
        assert!(matches!(
            ClientError::from(forbidden),
            ClientError::PermissionDenied(_)
        ));

        let server_err = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "etcd timeout".into(),
            reason: "InternalError".into(),
            code: 500,
        });
        assert!(matches!(
            ClientError::from(server_err),
            ClientError::Transient(_)
        ));
    }
}
