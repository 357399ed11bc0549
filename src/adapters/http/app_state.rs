use std::sync::Arc;

use crate::{infra::config::AppConfig, use_cases::stripe_events::StripeEventUseCases};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stripe_events: Arc<StripeEventUseCases>,
}
