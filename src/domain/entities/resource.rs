use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::plan::PlanLimits;

pub const AUTO_ARCHIVE_REASON: &str = "auto_archived_limit_exceeded";

/// Kinds of user-owned items subject to plan quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Folder,
    Calculator,
    Contact,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Folder,
        ResourceKind::Calculator,
        ResourceKind::Contact,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            ResourceKind::Folder => "folders",
            ResourceKind::Calculator => "calculators",
            ResourceKind::Contact => "contacts",
        }
    }

    pub fn limit(&self, limits: &PlanLimits) -> i64 {
        match self {
            ResourceKind::Folder => limits.max_folders,
            ResourceKind::Calculator => limits.max_calculators,
            ResourceKind::Contact => limits.max_contacts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: ResourceKind,
    pub name: String,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-kind counts. Used for live usage, excess over a quota and archive totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCounts {
    pub folders: i64,
    pub calculators: i64,
    pub contacts: i64,
}

impl ResourceCounts {
    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Folder => self.folders,
            ResourceKind::Calculator => self.calculators,
            ResourceKind::Contact => self.contacts,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, value: i64) {
        match kind {
            ResourceKind::Folder => self.folders = value,
            ResourceKind::Calculator => self.calculators = value,
            ResourceKind::Contact => self.contacts = value,
        }
    }

    pub fn total(&self) -> i64 {
        self.folders + self.calculators + self.contacts
    }

    /// `max(0, current - limit)` for each kind.
    pub fn excess_over(&self, limits: &PlanLimits) -> ResourceCounts {
        let mut excess = ResourceCounts::default();
        for kind in ResourceKind::ALL {
            excess.set(kind, (self.get(kind) - kind.limit(limits)).max(0));
        }
        excess
    }
}
