use std::collections::HashSet;
use std::path::Path;

use ledger::Amount;
use serde::Deserialize;
use serde_json::Value;

use crate::types::{ClusterError, ReplicaId};

/// One branch of the cluster and the balance it starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSpec {
    pub id: ReplicaId,
    pub initial_balance: Amount,
}

#[derive(Deserialize)]
struct RawBranch {
    id: ReplicaId,
    balance: serde_json::Number,
}

/// Cluster description read at bootstrap.
///
/// The input is a JSON array shared with the driver's scenario file: entries
/// with `"type": "branch"` describe branches, everything else is ignored here.
#[derive(Debug, Clone)]
pub struct ClusterDescription {
    pub branches: Vec<BranchSpec>,
}

impl ClusterDescription {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClusterError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ClusterError> {
        let entries: Vec<Value> = serde_json::from_str(content)?;

        let mut branches = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries {
            if entry.get("type").and_then(Value::as_str) != Some("branch") {
                continue;
            }
            let raw: RawBranch = serde_json::from_value(entry)?;
            if raw.id == 0 {
                return Err(ClusterError::InvalidDescription("branch ids start at 1".to_string()));
            }
            if !seen.insert(raw.id) {
                return Err(ClusterError::InvalidDescription(format!("duplicate branch id {}", raw.id)));
            }

            let initial_balance: Amount = raw.balance.to_string().parse().map_err(|e| {
                ClusterError::InvalidDescription(format!("branch {}: {}", raw.id, e))
            })?;
            if initial_balance < Amount::ZERO {
                return Err(ClusterError::InvalidDescription(format!(
                    "branch {} has a negative initial balance",
                    raw.id
                )));
            }

            branches.push(BranchSpec {
                id: raw.id,
                initial_balance,
            });
        }

        if branches.is_empty() {
            return Err(ClusterError::InvalidDescription("no branches defined".to_string()));
        }
        branches.sort_by_key(|b| b.id);

        Ok(ClusterDescription { branches })
    }

    pub fn ids(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.branches.iter().map(|b| b.id)
    }
}
