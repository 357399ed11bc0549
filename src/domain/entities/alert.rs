use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub const ARCHIVED_ROUTE: &str = "/archived";

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
pub enum AlertLevel {
    #[default]
    Info,
    Warning,
}

/// In-app alert shown to a user on their next visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub user_id: Uuid,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub icon: String,
    pub action_text: String,
    pub route: String,
}

impl NewAlert {
    /// Raised when an expired downgrade or cancellation grace period was enforced.
    pub fn auto_archive_completed(user_id: Uuid, archived_total: i64) -> Self {
        Self {
            user_id,
            level: AlertLevel::Info,
            title: "Auto-archive completed".into(),
            message: format!(
                "{} {} that exceeded your plan limits {} archived.",
                archived_total,
                items(archived_total),
                were(archived_total)
            ),
            icon: "Archive".into(),
            action_text: "View archived".into(),
            route: ARCHIVED_ROUTE.into(),
        }
    }

    /// Raised when the payment grace period ran out and the account was moved to free.
    pub fn account_archived_for_nonpayment(user_id: Uuid, archived_total: i64) -> Self {
        Self {
            user_id,
            level: AlertLevel::Warning,
            title: "Account moved to the free plan".into(),
            message: format!(
                "Your payment grace period ended. {} {} over the free plan limits {} archived.",
                archived_total,
                items(archived_total),
                were(archived_total)
            ),
            icon: "Archive".into(),
            action_text: "View archived".into(),
            route: ARCHIVED_ROUTE.into(),
        }
    }
}

fn items(n: i64) -> &'static str {
    if n == 1 { "item" } else { "items" }
}

fn were(n: i64) -> &'static str {
    if n == 1 { "was" } else { "were" }
}
