//! Missions assigned to alchemists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AlchemistId, MissionId};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub title: String,
    pub description: String,
    pub priority: MissionPriority,
    /// Alchemist the mission is assigned to, if any.
    pub alchemist: Option<AlchemistId>,
    /// Free-form list of materials the mission needs.
    pub materials: String,
    pub state: MissionState,
    pub final_report: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl MissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for MissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for MissionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::InvalidArgument(format!(
                "unknown mission state '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPriority {
    Low,
    Medium,
    High,
}

impl MissionPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for MissionPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for MissionPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::InvalidArgument(format!(
                "unknown mission priority '{other}'"
            ))),
        }
    }
}

/// Builder for new missions.
#[derive(Debug, Clone)]
pub struct NewMission {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) priority: MissionPriority,
    pub(crate) alchemist: Option<AlchemistId>,
    pub(crate) materials: String,
}

impl NewMission {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: MissionPriority::Medium,
            alchemist: None,
            materials: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn priority(mut self, priority: MissionPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn alchemist(mut self, alchemist: AlchemistId) -> Self {
        self.alchemist = Some(alchemist);
        self
    }

    pub fn materials(mut self, materials: impl Into<String>) -> Self {
        self.materials = materials.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidArgument("mission title is required".into()));
        }
        Ok(())
    }

    pub fn into_mission(self) -> Mission {
        Mission {
            id: MissionId::new(),
            title: self.title,
            description: self.description,
            priority: self.priority,
            alchemist: self.alchemist,
            materials: self.materials,
            state: MissionState::Pending,
            final_report: None,
            created_at: Utc::now(),
            closed_at: None,
        }
    }
}

/// A change to a mission's state and/or final report.
#[derive(Debug, Clone, Default)]
pub struct MissionUpdate {
    pub state: Option<MissionState>,
    /// Setting a report closes the mission (stamps `closed_at`).
    pub final_report: Option<String>,
}

impl MissionUpdate {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.final_report.is_none()
    }

    /// Apply to a mission in place.
    pub fn apply(&self, mission: &mut Mission) {
        if let Some(state) = self.state {
            mission.state = state;
        }
        if let Some(ref report) = self.final_report {
            mission.final_report = Some(report.clone());
            mission.closed_at = Some(Utc::now());
        }
    }
}
