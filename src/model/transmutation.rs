//! Transmutations: created pending, resolved once by the worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TransmutationId;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmutation {
    pub id: TransmutationId,
    pub name: String,
    pub description: String,
    pub cost: f64,
    pub state: TransmutationState,
    /// Empty until resolved.
    pub result: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Persisted lifecycle state. "Processing" exists only inside a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmutationState {
    Pending,
    Completed,
    Failed,
}

impl TransmutationState {
    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransmutationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TransmutationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidArgument(format!(
                "unknown transmutation state '{other}'"
            ))),
        }
    }
}

/// Parameters for creating a transmutation.
#[derive(Debug, Clone)]
pub struct NewTransmutation {
    pub name: String,
    pub description: String,
    pub cost: f64,
}

impl NewTransmutation {
    pub fn new(name: impl Into<String>, cost: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cost,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("transmutation name is required".into()));
        }
        if !self.cost.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "cost must be a finite number, got {}",
                self.cost
            )));
        }
        Ok(())
    }

    pub fn into_transmutation(self) -> Transmutation {
        let now = Utc::now();
        Transmutation {
            id: TransmutationId::new(),
            name: self.name,
            description: self.description,
            cost: self.cost,
            state: TransmutationState::Pending,
            result: String::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resolved_states_are_terminal() {
        assert!(!TransmutationState::Pending.is_terminal());
        assert!(TransmutationState::Completed.is_terminal());
        assert!(TransmutationState::Failed.is_terminal());
    }

    #[test]
    fn state_parses_its_display_form() {
        for state in [
            TransmutationState::Pending,
            TransmutationState::Completed,
            TransmutationState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<TransmutationState>().unwrap(), state);
        }
        assert!("processing".parse::<TransmutationState>().is_err());
    }

    #[test]
    fn new_transmutation_starts_pending() {
        let t = NewTransmutation::new("X", 100.0).into_transmutation();
        assert_eq!(t.state, TransmutationState::Pending);
        assert!(t.result.is_empty());
        assert!(t.resolved_at.is_none());
    }
}
