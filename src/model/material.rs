//! Material stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MaterialId;
use crate::error::{Error, Result};

/// A stocked material. `quantity >= 0` between transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    /// Quantity after applying `delta`, or `InsufficientStock` if it would
    /// go negative. A result that overflows to infinity is `InvalidArgument`.
    ///
    /// Every storage backend calls this while holding the row lock, so the
    /// finite, non-negative rule lives in exactly one place.
    pub fn adjusted(&self, delta: f64) -> Result<f64> {
        let candidate = self.quantity + delta;
        if !candidate.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "adjusting {} by {delta} overflows the quantity",
                self.quantity
            )));
        }
        if candidate < 0.0 {
            return Err(Error::InsufficientStock {
                available: self.quantity,
                requested: delta,
            });
        }
        Ok(candidate)
    }
}

/// Parameters for creating a material.
#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub name: String,
    pub unit: String,
    pub quantity: f64,
}

impl NewMaterial {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, quantity: f64) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            quantity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("material name is required".into()));
        }
        if self.unit.trim().is_empty() {
            return Err(Error::InvalidArgument("material unit is required".into()));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "initial quantity must be a non-negative number, got {}",
                self.quantity
            )));
        }
        Ok(())
    }

    /// Build the full record with a fresh ID.
    pub fn into_material(self) -> Material {
        let now = Utc::now();
        Material {
            id: MaterialId::new(),
            name: self.name,
            unit: self.unit,
            quantity: self.quantity,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A change to a material's name and/or unit. Quantity only moves through
/// the ledger.
#[derive(Debug, Clone, Default)]
pub struct MaterialRename {
    pub name: Option<String>,
    pub unit: Option<String>,
}

impl MaterialRename {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_none() && self.unit.is_none() {
            return Err(Error::InvalidArgument(
                "rename must set a name or a unit".into(),
            ));
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::InvalidArgument("material name is required".into()));
        }
        if self.unit.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(Error::InvalidArgument("material unit is required".into()));
        }
        Ok(())
    }

    /// Apply to a material in place. Does not touch `updated_at`.
    pub fn apply(&self, material: &mut Material) {
        if let Some(ref name) = self.name {
            material.name = name.clone();
        }
        if let Some(ref unit) = self.unit {
            material.unit = unit.clone();
        }
    }
}

/// Listing filter: case-insensitive substring over name and unit.
#[derive(Debug, Clone, Default)]
pub struct MaterialFilter {
    pub query: Option<String>,
}

impl MaterialFilter {
    pub fn matches(&self, material: &Material) -> bool {
        match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(q) => {
                let q = q.to_lowercase();
                material.name.to_lowercase().contains(&q)
                    || material.unit.to_lowercase().contains(&q)
            }
        }
    }
}
