//! Action outcome taxonomy.
//!
//! Every goal action reports exactly one [`Outcome`]. The engine never
//! inspects action internals; the tagged variant is the whole contract
//! between an action and the scheduler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of running one goal action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The action completed; `artifact` is an optional payload for
    /// downstream consumers (image tag, version string, manifest).
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<Value>,
    },
    /// The action failed. `retryable` marks transient failures the engine
    /// may re-attempt when the goal opts into retry.
    Failure { retryable: bool, message: String },
    /// The action declined to run (e.g. nothing to do for this push).
    Skipped { reason: String },
}

impl Outcome {
    /// Plain success without an artifact.
    pub fn success() -> Self {
        Self::Success { artifact: None }
    }

    /// Success carrying an artifact payload.
    pub fn success_with(artifact: impl Into<Value>) -> Self {
        Self::Success {
            artifact: Some(artifact.into()),
        }
    }

    /// Transient failure the engine may retry.
    pub fn transient(message: &str) -> Self {
        Self::Failure {
            retryable: true,
            message: message.to_string(),
        }
    }

    /// Permanent failure; never retried.
    pub fn permanent(message: &str) -> Self {
        Self::Failure {
            retryable: false,
            message: message.to_string(),
        }
    }

    /// The action declined to run.
    pub fn skipped(reason: &str) -> Self {
        Self::Skipped {
            reason: reason.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// True for `Failure { retryable: true }` only.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failure { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_tag_variants() {
        assert!(Outcome::success().is_success());
        assert!(Outcome::success_with("1.2.3").is_success());
        assert!(Outcome::transient("registry timeout").is_retryable());
        assert!(!Outcome::permanent("bad manifest").is_retryable());
        assert!(!Outcome::skipped("no dockerfile").is_success());
    }

    #[test]
    fn serializes_with_outcome_tag() {
        let json = serde_json::to_string(&Outcome::transient("registry timeout")).unwrap();
        assert!(json.contains("\"outcome\":\"failure\""));
        assert!(json.contains("\"retryable\":true"));

        let json = serde_json::to_string(&Outcome::success()).unwrap();
        assert!(json.contains("\"outcome\":\"success\""));
        assert!(!json.contains("artifact"));
    }
}
