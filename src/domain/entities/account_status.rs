use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Service-side account standing, driven by the dunning ladder and the sweeper.
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
pub enum AccountStatus {
    #[default]
    Active,
    /// First payment failure recorded
    AtRisk,
    /// Third failure, premium features suspended
    Suspended,
    /// Fourth failure or later, archiving scheduled
    GracePeriod,
    /// Terminal: resources over the free quota were archived
    Archived,
}

impl AccountStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AccountStatus::Archived)
    }
}
