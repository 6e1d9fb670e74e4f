use serde::{Deserialize, Serialize};

use crate::data::{Zone, ZoneQuality, ZoneStrength, ZoneType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Fresh,
    Tested,
}

impl ZoneStatus {
    pub fn of(zone: &Zone) -> Self {
        if zone.is_fresh {
            ZoneStatus::Fresh
        } else {
            ZoneStatus::Tested
        }
    }
}

/// Display-side selection over detected zones. Empty sets accept everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneFilter {
    pub types: Vec<ZoneType>,
    pub strengths: Vec<ZoneStrength>,
    pub statuses: Vec<ZoneStatus>,
    pub qualities: Vec<ZoneQuality>,
    pub min_reaction: f64,
    pub htf_only: bool,
}

impl ZoneFilter {
    pub fn accepts(&self, zone: &Zone) -> bool {
        allowed(&self.types, &zone.zone_type)
            && allowed(&self.strengths, &zone.strength())
            && allowed(&self.statuses, &ZoneStatus::of(zone))
            && allowed(&self.qualities, &zone.zone_quality)
            && zone.reaction_strength >= self.min_reaction
            && (!self.htf_only || zone.has_htf_support == Some(true))
    }

    /// Zones passing the filter, order preserved.
    pub fn apply(&self, zones: &[Zone]) -> Vec<Zone> {
        zones.iter().filter(|zone| self.accepts(zone)).cloned().collect()
    }
}

fn allowed<T: PartialEq>(set: &[T], value: &T) -> bool {
    set.is_empty() || set.contains(value)
}
