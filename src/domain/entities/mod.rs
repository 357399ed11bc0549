pub mod account_status;
pub mod alert;
pub mod billing_record;
pub mod delivery_mode;
pub mod plan;
pub mod resource;
pub mod stripe_event;
pub mod subscription_status;
pub mod webhook_event;
