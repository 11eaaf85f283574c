//! Missions and the alchemist roster they are assigned from.

use std::sync::Arc;

use tracing::info;

use crate::audit::AuditSink;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{AlchemistStore, MissionStore};

#[derive(Clone)]
pub struct MissionService {
    store: Arc<dyn MissionStore>,
    alchemists: Arc<dyn AlchemistStore>,
    audit: AuditSink,
}

impl MissionService {
    pub fn new(
        store: Arc<dyn MissionStore>,
        alchemists: Arc<dyn AlchemistStore>,
        audit: AuditSink,
    ) -> Self {
        Self {
            store,
            alchemists,
            audit,
        }
    }

    pub async fn register_alchemist(&self, new: NewAlchemist) -> Result<Alchemist> {
        new.validate()?;
        let alchemist = new.into_alchemist();
        self.alchemists.insert_alchemist(&alchemist).await?;
        info!(alchemist = %alchemist.id, name = %alchemist.name, "alchemist registered");
        Ok(alchemist)
    }

    pub async fn get_alchemist(&self, id: AlchemistId) -> Result<Alchemist> {
        self.alchemists.get_alchemist(id).await
    }

    pub async fn list_alchemists(&self, limit: i64) -> Result<Vec<Alchemist>> {
        self.alchemists.list_alchemists(limit).await
    }

    /// Create a pending mission, optionally assigned to a registered
    /// alchemist.
    pub async fn create(&self, new: NewMission) -> Result<Mission> {
        new.validate()?;
        if let Some(id) = new.alchemist {
            match self.alchemists.get_alchemist(id).await {
                Ok(_) => {}
                Err(Error::NotFound(_)) => {
                    return Err(Error::InvalidArgument(format!(
                        "mission references unknown alchemist {id}"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        let mission = new.into_mission();
        self.store.insert_mission(&mission).await?;
        info!(mission = %mission.id, title = %mission.title, "mission created");
        Ok(mission)
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<Mission>> {
        self.store.list_missions(limit).await
    }

    /// Change a mission's state and/or attach its final report.
    pub async fn update(&self, id: MissionId, update: MissionUpdate, actor: Actor) -> Result<Mission> {
        if update.is_empty() {
            return Err(Error::InvalidArgument(
                "mission update must set a state or a report".into(),
            ));
        }

        let mission = self.store.update_mission(id, &update).await?;
        info!(mission = %mission.id, state = %mission.state, "mission updated");

        let mut detail = format!(
            "Mission {} ({}): state={}",
            mission.id, mission.title, mission.state
        );
        if update.final_report.is_some() {
            detail.push_str(", report filed");
        }
        self.audit.record(actor, "mission_updated", "mission", detail);

        Ok(mission)
    }
}
