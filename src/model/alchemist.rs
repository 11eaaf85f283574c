//! The alchemist roster. Missions are assigned to its members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AlchemistId;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alchemist {
    pub id: AlchemistId,
    pub name: String,
    pub rank: String,
    pub specialty: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Builder for a new roster entry.
#[derive(Debug, Clone)]
pub struct NewAlchemist {
    pub(crate) name: String,
    pub(crate) rank: String,
    pub(crate) specialty: String,
}

impl NewAlchemist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank: String::new(),
            specialty: String::new(),
        }
    }

    pub fn rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = rank.into();
        self
    }

    pub fn specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = specialty.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("alchemist name is required".into()));
        }
        Ok(())
    }

    pub fn into_alchemist(self) -> Alchemist {
        let now = Utc::now();
        Alchemist {
            id: AlchemistId::new(),
            name: self.name,
            rank: self.rank,
            specialty: self.specialty,
            created_at: now,
            updated_at: now,
        }
    }
}
