//! Core data model.
//!
//! Materials are stock with a quantity that never goes negative.
//! Transmutations are queued jobs resolved by the worker pool. Missions are
//! records assigned to registered alchemists, and the monitor keeps an eye
//! on them. Audit events are the append-only trail of every mutation.

pub mod alchemist;
pub mod audit;
pub mod job;
pub mod material;
pub mod mission;
pub mod transmutation;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use alchemist::{Alchemist, NewAlchemist};
pub use audit::{AuditEvent, NewAuditEvent};
pub use job::{Delivery, Job, TRANSMUTATION_JOB, TransmutationJob};
pub use material::{Material, MaterialFilter, MaterialRename, NewMaterial};
pub use mission::{Mission, MissionPriority, MissionState, MissionUpdate, NewMission};
pub use transmutation::{NewTransmutation, Transmutation, TransmutationState};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    crate::error::Error::InvalidArgument(format!("bad id '{s}': {e}"))
                })
            }
        }
    };
}

id_newtype!(
    /// Identifier of a material.
    MaterialId
);
id_newtype!(
    /// Identifier of a transmutation.
    TransmutationId
);
id_newtype!(MissionId);
id_newtype!(AlchemistId);
id_newtype!(AuditId);

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Who performed a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Background work: the worker pool and the monitor.
    System,
    User(Uuid),
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::User(id) => write!(f, "{id}"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        if s == "system" {
            return Ok(Actor::System);
        }
        Uuid::parse_str(s)
            .map(Actor::User)
            .map_err(|_| crate::error::Error::InvalidArgument(format!("bad actor '{s}'")))
    }
}
