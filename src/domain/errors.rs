//! Governance error types.
//!
//! `GovernanceError` covers API-level failures; `AdmissionFault` is the
//! graded verdict the admission pipeline attaches to rejected objects and
//! votes, carrying the peer penalty the caller may apply.

use thiserror::Error;

/// Errors surfaced by the governance manager's API.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("malformed payload document: {0}")]
    MalformedPayload(String),

    #[error("unknown governance object {0}")]
    UnknownObject(String),

    #[error("invalid governance object: {0}")]
    InvalidObject(String),

    #[error("snapshot corrupt: {0}")]
    Snapshot(String),

    #[error("content store failure: {0}")]
    ContentStore(String),

    #[error("chain lookup failure: {0}")]
    Chain(String),
}

/// How bad a rejected message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSeverity {
    /// Recoverable; may trigger a follow-up request, never a ban.
    Warning,
    /// Transient local condition (e.g. voting too often); retry later.
    TemporaryError,
    /// Malformed or long-known-invalid; carries a peer penalty.
    PermanentError,
    /// Validator anomaly; logged, never escalated to the peer.
    InternalError,
}

/// A graded rejection from object or vote admission.
#[derive(Debug, Clone)]
pub struct AdmissionFault {
    pub severity: FaultSeverity,
    pub message: String,
    /// Ban score to apply to the sending peer; 0 for no penalty.
    pub node_penalty: i32,
}

impl AdmissionFault {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: FaultSeverity::Warning,
            message: message.into(),
            node_penalty: 0,
        }
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self {
            severity: FaultSeverity::TemporaryError,
            message: message.into(),
            node_penalty: 0,
        }
    }

    pub fn permanent(message: impl Into<String>, node_penalty: i32) -> Self {
        Self {
            severity: FaultSeverity::PermanentError,
            message: message.into(),
            node_penalty,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            severity: FaultSeverity::InternalError,
            message: message.into(),
            node_penalty: 0,
        }
    }
}

impl std::fmt::Display for AdmissionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.severity, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_severity_and_penalty() {
        assert_eq!(AdmissionFault::warning("w").node_penalty, 0);
        let fault = AdmissionFault::permanent("bad", 20);
        assert_eq!(fault.severity, FaultSeverity::PermanentError);
        assert_eq!(fault.node_penalty, 20);
    }

    #[test]
    fn display_includes_severity_and_message() {
        let fault = AdmissionFault::temporary("voting too often");
        let text = fault.to_string();
        assert!(text.contains("TemporaryError"));
        assert!(text.contains("voting too often"));
    }
}
