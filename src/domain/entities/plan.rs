use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Subscription plan tier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Plan {
    #[default]
    Free,
    Standard,
    Premium,
}

impl Plan {
    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Standard => "Standard",
            Plan::Premium => "Premium",
        }
    }
}

/// Resource quotas granted by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_folders: i64,
    pub max_calculators: i64,
    pub max_contacts: i64,
    pub storage_limit_mb: i64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        limits_for(Plan::Free)
    }
}

/// Feature flags granted by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanFeatures {
    pub advanced_analytics: bool,
    pub export_reports: bool,
    pub task_automation: bool,
    pub bulk_operations: bool,
    pub priority_support: bool,
    pub linked_folders: bool,
    pub booking: bool,
}

impl PlanFeatures {
    /// Human-readable names of every enabled feature, in a stable order.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        [
            (self.advanced_analytics, "Advanced analytics"),
            (self.export_reports, "Report export"),
            (self.task_automation, "Task automation"),
            (self.bulk_operations, "Bulk operations"),
            (self.priority_support, "Priority support"),
            (self.linked_folders, "Linked folders"),
            (self.booking, "Booking"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }
}

const UNLIMITED: i64 = 999_999;

/// Built-in quota table. Used whenever the plan catalog store has no entry.
pub fn limits_for(plan: Plan) -> PlanLimits {
    match plan {
        Plan::Free => PlanLimits {
            max_folders: 5,
            max_calculators: 3,
            max_contacts: 10,
            storage_limit_mb: 50,
        },
        Plan::Standard => PlanLimits {
            max_folders: 50,
            max_calculators: 20,
            max_contacts: 100,
            storage_limit_mb: 1024,
        },
        Plan::Premium => PlanLimits {
            max_folders: UNLIMITED,
            max_calculators: UNLIMITED,
            max_contacts: UNLIMITED,
            storage_limit_mb: 10240,
        },
    }
}

/// Built-in feature table. Used whenever the plan catalog store has no entry.
pub fn features_for(plan: Plan) -> PlanFeatures {
    match plan {
        Plan::Free => PlanFeatures::default(),
        Plan::Standard => PlanFeatures {
            export_reports: true,
            bulk_operations: true,
            linked_folders: true,
            booking: true,
            ..PlanFeatures::default()
        },
        Plan::Premium => PlanFeatures {
            advanced_analytics: true,
            export_reports: true,
            task_automation: true,
            bulk_operations: true,
            priority_support: true,
            linked_folders: true,
            booking: true,
        },
    }
}

/// Built-in monthly price in cents.
pub fn price_cents_for(plan: Plan) -> i64 {
    match plan {
        Plan::Free => 0,
        Plan::Standard => 1999,
        Plan::Premium => 4999,
    }
}
