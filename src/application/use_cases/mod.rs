pub mod alerts;
pub mod billing_record;
pub mod grace_period;
pub mod payment_failures;
pub mod plan_catalog;
pub mod resource_archiver;
pub mod stripe_events;
pub mod user_directory;
pub mod webhook_ledger;
