use crate::error::TypesError;
use crate::id::{Address, Bytes32, TaskId};
use crate::Wei;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Capability labels drawn from the closed set of services the marketplace
/// knows how to hire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    ImageGeneration,
    SummaryGeneration,
    Researcher,
    Writer,
    MarketResearch,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::ImageGeneration,
        TaskType::SummaryGeneration,
        TaskType::Researcher,
        TaskType::Writer,
        TaskType::MarketResearch,
    ];

    /// Canonical wire label, matching worker manifest service ids.
    pub fn label(&self) -> &'static str {
        match self {
            TaskType::ImageGeneration => "image-generation",
            TaskType::SummaryGeneration => "summary-generation",
            TaskType::Researcher => "researcher",
            TaskType::Writer => "writer",
            TaskType::MarketResearch => "market-research",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, TypesError> {
        match label {
            "image-generation" => Ok(TaskType::ImageGeneration),
            "summary-generation" => Ok(TaskType::SummaryGeneration),
            "researcher" => Ok(TaskType::Researcher),
            "writer" => Ok(TaskType::Writer),
            "market-research" => Ok(TaskType::MarketResearch),
            other => Err(TypesError::UnknownTaskType(other.to_string())),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Task lifecycle states. The transition table below is authoritative;
/// every status mutation in the workspace goes through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Validated locally, no escrow yet.
    Pending,
    /// Escrow deposited on chain.
    Created,
    /// Worker accepted the signed authorization.
    Authorized,
    /// Worker executing, completion awaited.
    Running,
    Completed,
    Refunded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Refunded | TaskStatus::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Refunds reclaim escrowed funds, so only escrow-bearing states qualify.
    pub fn can_refund(&self) -> bool {
        matches!(
            self,
            TaskStatus::Created | TaskStatus::Authorized | TaskStatus::Running
        )
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Created) | (Pending, Failed) => true,
            (Created, Authorized) | (Created, Refunded) | (Created, Failed) => true,
            (Authorized, Running) | (Authorized, Refunded) | (Authorized, Failed) => true,
            (Running, Completed) | (Running, Refunded) | (Running, Failed) => true,
            _ => false,
        }
    }

    /// On-chain escrow status codes: 0 CREATED, 1 COMPLETED, 2 DISPUTED,
    /// 3 REFUNDED. DISPUTED maps to terminal Failed; there is no dispute
    /// workflow on the master side.
    pub fn from_chain_status(code: u8) -> Option<TaskStatus> {
        match code {
            0 => Some(TaskStatus::Created),
            1 => Some(TaskStatus::Completed),
            2 => Some(TaskStatus::Failed),
            3 => Some(TaskStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Created => "created",
            TaskStatus::Authorized => "authorized",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Refunded => "refunded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Signed authorization triple stored on the task record once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    /// 65-byte signature as 0x-hex.
    pub signature: String,
    pub nonce: u64,
    pub expires_at: DateTime<Utc>,
}

/// The canonical unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub input_parameters: serde_json::Value,
    pub required_capabilities: BTreeSet<String>,
    pub deadline: DateTime<Utc>,
    pub budget: Wei,
    pub status: TaskStatus,
    pub assigned_worker: Option<Address>,
    pub escrow_tx_hash: Option<Bytes32>,
    pub result_hash: Option<Bytes32>,
    pub authorization: Option<AuthorizationRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Seconds left until the deadline, clamped at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.deadline - now).num_seconds().max(0) as u64
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_labels_round_trip() {
        for t in TaskType::ALL {
            assert_eq!(TaskType::from_label(t.label()).unwrap(), t);
        }
        assert!(TaskType::from_label("quantum-welding").is_err());
    }

    #[test]
    fn test_task_type_serde_kebab_case() {
        let json = serde_json::to_string(&TaskType::SummaryGeneration).unwrap();
        assert_eq!(json, "\"summary-generation\"");
    }

    #[test]
    fn test_happy_path_is_legal() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Created));
        assert!(TaskStatus::Created.can_transition_to(TaskStatus::Authorized));
        assert!(TaskStatus::Authorized.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for terminal in [TaskStatus::Completed, TaskStatus::Refunded, TaskStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Pending,
                TaskStatus::Created,
                TaskStatus::Authorized,
                TaskStatus::Running,
                TaskStatus::Completed,
                TaskStatus::Refunded,
                TaskStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_skipping_states_is_illegal() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Authorized));
        assert!(!TaskStatus::Created.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Authorized.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Refunded));
    }

    #[test]
    fn test_refund_only_from_escrowed_states() {
        assert!(!TaskStatus::Pending.can_refund());
        assert!(TaskStatus::Created.can_refund());
        assert!(TaskStatus::Authorized.can_refund());
        assert!(TaskStatus::Running.can_refund());
        assert!(!TaskStatus::Completed.can_refund());
    }

    #[test]
    fn test_complete_only_from_running() {
        assert!(TaskStatus::Running.can_complete());
        assert!(!TaskStatus::Authorized.can_complete());
        assert!(!TaskStatus::Created.can_complete());
    }

    #[test]
    fn test_chain_status_mapping() {
        assert_eq!(TaskStatus::from_chain_status(0), Some(TaskStatus::Created));
        assert_eq!(TaskStatus::from_chain_status(1), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::from_chain_status(2), Some(TaskStatus::Failed));
        assert_eq!(TaskStatus::from_chain_status(3), Some(TaskStatus::Refunded));
        assert_eq!(TaskStatus::from_chain_status(9), None);
    }
}
