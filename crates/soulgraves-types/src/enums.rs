//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a soul.
///
/// `Normal` and `Panic` are observational: both count down identically.
/// `Exploding` is terminal and entered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoulState {
    /// Counting down, remaining time above the panic threshold.
    #[default]
    Normal,
    /// Remaining time at or below the panic threshold.
    Panic,
    /// Destructive teardown in progress; contents will be dropped.
    Exploding,
}

impl SoulState {
    /// Whether this state is terminal.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exploding)
    }
}

impl core::fmt::Display for SoulState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Panic => write!(f, "PANIC"),
            Self::Exploding => write!(f, "EXPLODING"),
        }
    }
}

/// Which persistence backend a node runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Soul existence is tracked in the world's own save data. Single node.
    #[default]
    Embedded,
    /// Souls live in a shared relational database. Cluster-wide.
    Database,
}

impl core::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::Database => write!(f, "database"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exploding_is_terminal() {
        assert!(!SoulState::Normal.is_terminal());
        assert!(!SoulState::Panic.is_terminal());
        assert!(SoulState::Exploding.is_terminal());
    }

    #[test]
    fn storage_mode_parses_from_config_spelling() {
        let mode: Result<StorageMode, _> = serde_json::from_str("\"database\"");
        assert_eq!(mode.ok(), Some(StorageMode::Database));
    }
}
