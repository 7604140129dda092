//! Process-wide catalog of recognized tank parameters.
//!
//! Loaded once at startup from the `[[tanks]]` section of the engine config
//! and never mutated afterward. The pipeline driver walks this list for
//! every telemetry event to decide which parameters to read.

use serde::{Deserialize, Serialize};

use crate::types::TankParameter;

/// On-disk shape of a single catalog entry, as it appears under
/// `[[tanks]]` in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TankParameterConfig {
    pub id: uuid::Uuid,
    pub name: String,
    pub msg_attr: String,
}

impl From<TankParameterConfig> for TankParameter {
    fn from(cfg: TankParameterConfig) -> Self {
        TankParameter {
            id: cfg.id,
            name: cfg.name,
            msg_attr: cfg.msg_attr,
        }
    }
}

/// Immutable, load-once set of tank parameters.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tanks: Vec<TankParameter>,
}

impl Catalog {
    pub fn new(tanks: Vec<TankParameter>) -> Self {
        Self { tanks }
    }

    pub fn tanks(&self) -> &[TankParameter] {
        &self.tanks
    }

    pub fn find_by_msg_attr(&self, msg_attr: &str) -> Option<&TankParameter> {
        self.tanks.iter().find(|t| t.msg_attr == msg_attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_tank_by_msg_attr() {
        let catalog = Catalog::new(vec![TankParameter {
            id: uuid::Uuid::nil(),
            name: "Main tank".into(),
            msg_attr: "fuel_main".into(),
        }]);
        assert!(catalog.find_by_msg_attr("fuel_main").is_some());
        assert!(catalog.find_by_msg_attr("fuel_aux").is_none());
    }
}
