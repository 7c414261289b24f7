//! Named cache-control operations
//!
//! Connectors expose the same cache controls under the same names. The
//! registry below is the single list of them; [`ControlCommand::from_call`]
//! turns a name plus JSON arguments into a typed command for
//! [`Client::execute`].

use ipfetch_core::{CacheError, StatsReport};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::Client;

/// Whether an operation changes cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
}

/// Registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlOperation {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OperationKind,
}

/// Every control operation a client accepts
pub static CONTROL_OPERATIONS: &[ControlOperation] = &[
    ControlOperation {
        name: "cache_stats",
        description: "Hit rate, entry count and size in MB of the response cache",
        kind: OperationKind::Query,
    },
    ControlOperation {
        name: "cache_clear",
        description: "Delete every cached response",
        kind: OperationKind::Mutation,
    },
    ControlOperation {
        name: "cache_clear_expired",
        description: "Delete cached responses stored more than `max_age_secs` seconds ago",
        kind: OperationKind::Mutation,
    },
    ControlOperation {
        name: "cache_invalidate",
        description: "Delete cached responses whose request URL matches the regular expression `pattern`",
        kind: OperationKind::Mutation,
    },
    ControlOperation {
        name: "cache_set_ttl",
        description: "Set the default lifetime in seconds for responses stored from now on; null stores only responses with explicit expiry",
        kind: OperationKind::Mutation,
    },
    ControlOperation {
        name: "cache_enable",
        description: "Resume using the response cache",
        kind: OperationKind::Mutation,
    },
    ControlOperation {
        name: "cache_disable",
        description: "Bypass the response cache for this client",
        kind: OperationKind::Mutation,
    },
];

/// Look up an operation by name
pub fn find_operation(name: &str) -> Option<&'static ControlOperation> {
    CONTROL_OPERATIONS.iter().find(|op| op.name == name)
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("unknown control operation: {0}")]
    UnknownOperation(String),

    #[error("invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },
}

/// A typed control operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ControlCommand {
    CacheStats,
    CacheClear,
    CacheClearExpired { max_age_secs: u64 },
    CacheInvalidate { pattern: String },
    CacheSetTtl { ttl_seconds: Option<u64> },
    CacheEnable,
    CacheDisable,
}

impl ControlCommand {
    /// Registry name of this command
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::CacheStats => "cache_stats",
            ControlCommand::CacheClear => "cache_clear",
            ControlCommand::CacheClearExpired { .. } => "cache_clear_expired",
            ControlCommand::CacheInvalidate { .. } => "cache_invalidate",
            ControlCommand::CacheSetTtl { .. } => "cache_set_ttl",
            ControlCommand::CacheEnable => "cache_enable",
            ControlCommand::CacheDisable => "cache_disable",
        }
    }

    /// Resolve a call by name with a JSON object of arguments
    ///
    /// `null` stands for no arguments.
    pub fn from_call(name: &str, args: serde_json::Value) -> Result<Self, ControlError> {
        let op = find_operation(name).ok_or_else(|| ControlError::UnknownOperation(name.to_string()))?;
        let invalid = |reason: String| ControlError::InvalidArguments {
            operation: op.name.to_string(),
            reason,
        };

        let mut object = match args {
            serde_json::Value::Null => serde_json::Map::new(),
            serde_json::Value::Object(map) => map,
            other => return Err(invalid(format!("expected an object, got {other}"))),
        };
        object.insert("operation".to_string(), serde_json::Value::from(op.name));

        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| invalid(e.to_string()))
    }
}

/// Result of a control operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlOutput {
    Stats(StatsReport),
    Removed { count: u64 },
    Ack,
}

impl Client {
    /// Run a control operation
    pub async fn execute(&self, command: ControlCommand) -> Result<ControlOutput, ControlError> {
        tracing::debug!(target: "ipfetch", operation = command.name(), "control operation");
        Ok(match command {
            ControlCommand::CacheStats => ControlOutput::Stats(self.cache_stats().await.report()),
            ControlCommand::CacheClear => ControlOutput::Removed {
                count: self.clear_cache().await?,
            },
            ControlCommand::CacheClearExpired { max_age_secs } => ControlOutput::Removed {
                count: self
                    .clear_expired(Duration::from_secs(max_age_secs))
                    .await?,
            },
            ControlCommand::CacheInvalidate { pattern } => ControlOutput::Removed {
                count: self.invalidate(&pattern).await?,
            },
            ControlCommand::CacheSetTtl { ttl_seconds } => {
                self.set_ttl(ttl_seconds.map(Duration::from_secs));
                ControlOutput::Ack
            }
            ControlCommand::CacheEnable => {
                self.enable_cache();
                ControlOutput::Ack
            }
            ControlCommand::CacheDisable => {
                self.disable_cache();
                ControlOutput::Ack
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_names_resolve() {
        assert_eq!(CONTROL_OPERATIONS.len(), 7);
        for op in CONTROL_OPERATIONS {
            assert!(!op.description.is_empty());
            let args = match op.name {
                "cache_clear_expired" => json!({"max_age_secs": 60}),
                "cache_invalidate" => json!({"pattern": "uspto"}),
                "cache_set_ttl" => json!({"ttl_seconds": 3600}),
                _ => serde_json::Value::Null,
            };
            let command = ControlCommand::from_call(op.name, args).unwrap();
            assert_eq!(command.name(), op.name);
        }
    }

    #[test]
    fn test_from_call_arguments() {
        assert_eq!(
            ControlCommand::from_call("cache_invalidate", json!({"pattern": "/patents/"})).unwrap(),
            ControlCommand::CacheInvalidate {
                pattern: "/patents/".to_string()
            }
        );
        assert_eq!(
            ControlCommand::from_call("cache_set_ttl", json!({"ttl_seconds": null})).unwrap(),
            ControlCommand::CacheSetTtl { ttl_seconds: None }
        );
    }

    #[test]
    fn test_from_call_errors() {
        assert!(matches!(
            ControlCommand::from_call("cache_explode", serde_json::Value::Null),
            Err(ControlError::UnknownOperation(_))
        ));
        assert!(matches!(
            ControlCommand::from_call("cache_invalidate", serde_json::Value::Null),
            Err(ControlError::InvalidArguments { .. })
        ));
        assert!(matches!(
            ControlCommand::from_call("cache_clear_expired", json!([1])),
            Err(ControlError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_output_serializes_tagged() {
        let value = serde_json::to_value(ControlOutput::Removed { count: 3 }).unwrap();
        assert_eq!(value, json!({"result": "removed", "count": 3}));
    }
}
