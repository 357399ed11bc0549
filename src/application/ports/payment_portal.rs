use async_trait::async_trait;

use crate::app_error::AppResult;

/// Static login page used when no portal session can be created.
pub fn fallback_portal_url(customer_id: &str) -> String {
    format!("https://billing.stripe.com/p/login/{}", customer_id)
}

/// Generates links that let a customer update their payment method.
#[async_trait]
pub trait PaymentPortal: Send + Sync {
    async fn generate_update_payment_url(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<String>;
}
