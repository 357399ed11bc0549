//! Recording and stub implementations of the outbound ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        notification::{DunningEmail, NotificationGateway, SubscriptionEmail},
        payment_portal::PaymentPortal,
    },
    application::use_cases::alerts::AlertRepoTrait,
    domain::entities::{alert::NewAlert, billing_record::DunningStage, delivery_mode::DeliveryMode},
};

// ============================================================================
// RecordingNotificationGateway
// ============================================================================

#[derive(Debug, Clone)]
pub enum SentNotification {
    PaymentFailed {
        to: String,
        stage: DunningStage,
        email: DunningEmail,
        mode: DeliveryMode,
    },
    Subscription {
        to: String,
        email: SubscriptionEmail,
        mode: DeliveryMode,
    },
}

impl SentNotification {
    pub fn mode(&self) -> DeliveryMode {
        match self {
            SentNotification::PaymentFailed { mode, .. } => *mode,
            SentNotification::Subscription { mode, .. } => *mode,
        }
    }
}

/// Records every send. A failing gateway records nothing and returns an error.
#[derive(Default)]
pub struct RecordingNotificationGateway {
    pub sent: Mutex<Vec<SentNotification>>,
    fail: bool,
}

impl RecordingNotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn dunning_stages(&self) -> Vec<DunningStage> {
        self.sent()
            .into_iter()
            .filter_map(|n| match n {
                SentNotification::PaymentFailed { stage, .. } => Some(stage),
                _ => None,
            })
            .collect()
    }

    pub fn subscription_emails(&self) -> Vec<SubscriptionEmail> {
        self.sent()
            .into_iter()
            .filter_map(|n| match n {
                SentNotification::Subscription { email, .. } => Some(email),
                _ => None,
            })
            .collect()
    }

    pub fn subscription_kinds(&self) -> Vec<&'static str> {
        self.subscription_emails().iter().map(|e| e.kind()).collect()
    }

    pub fn modes(&self) -> Vec<DeliveryMode> {
        self.sent().iter().map(|n| n.mode()).collect()
    }

    fn record(&self, notification: SentNotification) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Notification("simulated provider outage".into()));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for RecordingNotificationGateway {
    async fn send_payment_failed_email(
        &self,
        to: &str,
        stage: DunningStage,
        email: &DunningEmail,
        mode: DeliveryMode,
    ) -> AppResult<()> {
        self.record(SentNotification::PaymentFailed {
            to: to.to_string(),
            stage,
            email: email.clone(),
            mode,
        })
    }

    async fn send_subscription_email(
        &self,
        to: &str,
        email: &SubscriptionEmail,
        mode: DeliveryMode,
    ) -> AppResult<()> {
        self.record(SentNotification::Subscription {
            to: to.to_string(),
            email: email.clone(),
            mode,
        })
    }
}

// ============================================================================
// StubPaymentPortal
// ============================================================================

#[derive(Default)]
pub struct StubPaymentPortal {
    fail: bool,
}

impl StubPaymentPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl PaymentPortal for StubPaymentPortal {
    async fn generate_update_payment_url(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> AppResult<String> {
        if self.fail {
            return Err(AppError::Internal("portal unavailable".into()));
        }
        Ok(format!("https://portal.example.com/session/{}", customer_id))
    }
}

// ============================================================================
// InMemoryAlertRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryAlertRepo {
    pub alerts: Mutex<Vec<(NewAlert, DateTime<Utc>)>>,
    fail: bool,
}

impl InMemoryAlertRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<NewAlert> {
        self.alerts.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
    }
}

#[async_trait]
impl AlertRepoTrait for InMemoryAlertRepo {
    async fn create(&self, alert: &NewAlert, now: DateTime<Utc>) -> AppResult<Uuid> {
        if self.fail {
            return Err(AppError::Database("simulated alert store failure".into()));
        }
        self.alerts.lock().unwrap().push((alert.clone(), now));
        Ok(Uuid::new_v4())
    }
}
