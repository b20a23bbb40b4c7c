use serde::{Deserialize, Serialize};

/// Server-assigned account identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stream (conversation thread).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct StreamId(pub i64);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a server-persisted chunk, unique within its stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChunkId(pub i64);

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transient activity of a participant in a stream.
///
/// The derived ordering is the display priority: when picking which status
/// to surface for a group, recording beats playing beats idle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    #[default]
    Idle,
    Playing,
    Recording,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Idle => "idle",
            ActivityStatus::Playing => "playing",
            ActivityStatus::Recording => "recording",
        }
    }
}

/// Membership status of an account, as reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Bot,
    Pending,
    /// Unrecognized status strings decode to this rather than failing the
    /// whole participant.
    #[serde(other)]
    Unknown,
}

impl AccountStatus {
    /// Bots count as active for presence purposes.
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active | AccountStatus::Bot)
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, AccountStatus::Bot)
    }
}

/// Milliseconds since the Unix epoch, the wire format for all timestamps.
pub type EpochMs = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> EpochMs {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_status_display_priority() {
        assert!(ActivityStatus::Recording > ActivityStatus::Playing);
        assert!(ActivityStatus::Playing > ActivityStatus::Idle);
        assert_eq!(
            [ActivityStatus::Playing, ActivityStatus::Recording, ActivityStatus::Idle]
                .iter()
                .max(),
            Some(&ActivityStatus::Recording)
        );
    }

    #[test]
    fn account_status_tolerates_unknown_values() {
        let status: AccountStatus = serde_json::from_str("\"banned\"").unwrap();
        assert_eq!(status, AccountStatus::Unknown);
        assert!(!status.is_active());
    }
}
