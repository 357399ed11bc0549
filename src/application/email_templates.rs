use chrono::{DateTime, Utc};
use url::Url;

use crate::{
    application::ports::notification::{DunningEmail, SubscriptionEmail},
    domain::entities::{billing_record::DunningStage, resource::ResourceCounts},
};

const BRAND_NAME: &str = "Billing";

fn origin_label(app_origin: &str) -> String {
    Url::parse(app_origin)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| app_origin.to_string())
}

pub fn primary_button(url: &str, label: &str) -> String {
    format!(
        r#"<a href="{url}" style="display:inline-block;padding:12px 18px;background-color:#111827;color:#ffffff;text-decoration:none;border-radius:8px;font-weight:600;">{label}</a>"#
    )
}

/// `4999, "usd"` renders as `$49.99`; other currencies as `49.99 EUR`.
pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    let amount = format!("{}{}.{:02}", sign, cents / 100, cents % 100);
    match currency.to_ascii_lowercase().as_str() {
        "usd" | "" => format!("${}", amount),
        other => format!("{} {}", amount, other.to_ascii_uppercase()),
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn paragraph(text: &str) -> String {
    format!(r#"<p style="margin:12px 0 0;color:#374151;">{}</p>"#, text)
}

fn counts_list(counts: &ResourceCounts) -> String {
    format!(
        r#"<ul style="margin:12px 0;color:#374151;padding-left:20px;">
          <li>Folders: {}</li>
          <li>Calculators: {}</li>
          <li>Contacts: {}</li>
        </ul>"#,
        counts.folders, counts.calculators, counts.contacts
    )
}

fn greeting(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("Hi {},", name),
        None => "Hi,".to_string(),
    }
}

// ============================================================================
// Dunning ladder
// ============================================================================

pub fn payment_failed_email(
    app_origin: &str,
    stage: DunningStage,
    email: &DunningEmail,
) -> (String, String) {
    let amount = format_amount(email.amount_cents, &email.currency);
    let button = primary_button(&email.update_payment_url, "Update payment method");
    let reason = "a payment for your subscription did not go through";
    let support = format!(
        "Questions? Contact us at <a href=\"mailto:{0}\">{0}</a>.",
        email.support_email
    );

    let (subject, headline, lead, details) = match stage {
        DunningStage::FirstWarning => {
            let retry = email
                .next_retry_date
                .map(|d| paragraph(&format!("We'll try again on {}.", format_date(d))))
                .unwrap_or_default();
            (
                "Action needed: your payment failed".to_string(),
                "We couldn't process your payment",
                format!(
                    "{} your payment of <strong>{}</strong> for the {} plan failed: {}.",
                    greeting(email.recipient_name.as_deref()),
                    amount,
                    email.plan_name,
                    email.failure_reason
                ),
                retry,
            )
        }
        DunningStage::SecondWarning => {
            let usage = email
                .current_usage
                .as_ref()
                .map(|u| {
                    format!(
                        "{}{}",
                        paragraph("Here is what you currently have on your plan:"),
                        counts_list(u)
                    )
                })
                .unwrap_or_default();
            (
                "Second notice: your payment is still failing".to_string(),
                "Your payment is still failing",
                format!(
                    "{} we still couldn't collect <strong>{}</strong> for your {} plan.",
                    greeting(email.recipient_name.as_deref()),
                    amount,
                    email.plan_name
                ),
                usage,
            )
        }
        DunningStage::FinalWarning => {
            let days = email.days_until_suspension.unwrap_or_default();
            let features = if email.affected_features.is_empty() {
                String::new()
            } else {
                let items: String = email
                    .affected_features
                    .iter()
                    .map(|f| format!("<li>{}</li>", f))
                    .collect();
                format!(
                    "{}<ul style=\"margin:12px 0;color:#374151;padding-left:20px;\">{}</ul>",
                    paragraph("These features are now paused:"),
                    items
                )
            };
            (
                format!("Final notice: account suspension in {} days", days),
                "Final notice before suspension",
                format!(
                    "{} your payment of <strong>{}</strong> failed again. Your account will be suspended in {} days unless you update your payment method.",
                    greeting(email.recipient_name.as_deref()),
                    amount,
                    days
                ),
                features,
            )
        }
        DunningStage::SuspensionNotice => {
            let archive = email
                .items_to_archive
                .as_ref()
                .filter(|c| c.total() > 0)
                .map(|c| {
                    format!(
                        "{}{}",
                        paragraph("If the grace period ends without payment, these items will be archived:"),
                        counts_list(c)
                    )
                })
                .unwrap_or_default();
            let end = email
                .grace_period_end_date
                .map(format_date)
                .unwrap_or_else(|| "the end of the grace period".to_string());
            (
                "Your account has been suspended".to_string(),
                "Account suspended",
                format!(
                    "{} we couldn't collect payment for your {} plan. Your account moves to the free plan on <strong>{}</strong>.",
                    greeting(email.recipient_name.as_deref()),
                    email.plan_name,
                    end
                ),
                archive,
            )
        }
    };

    let body = format!("{}{}", button, details);
    let html = wrap_email(app_origin, headline, &lead, &body, reason, Some(&support));
    (subject, html)
}

// ============================================================================
// Lifecycle
// ============================================================================

pub fn subscription_email(app_origin: &str, email: &SubscriptionEmail) -> (String, String) {
    let reason = "your subscription status changed";

    let (subject, headline, lead, body) = match email {
        SubscriptionEmail::PaymentRecovered { plan_name } => (
            "Payment received, you're all set".to_string(),
            "Payment received",
            format!(
                "Thanks! Your payment went through and your <strong>{}</strong> plan is fully active again.",
                plan_name
            ),
            String::new(),
        ),
        SubscriptionEmail::GracePeriodExpired {
            target_plan,
            archived,
        } => (
            "Grace period ended, items archived".to_string(),
            "Your grace period has ended",
            format!(
                "Your account is now on the <strong>{}</strong> plan. Items over the plan limits were archived, not deleted.",
                target_plan.display_name()
            ),
            format!(
                "{}{}",
                paragraph("Archived items:"),
                counts_list(archived)
            ),
        ),
        SubscriptionEmail::GracePeriodWithinLimits { target_plan } => (
            "Grace period ended".to_string(),
            "Your grace period has ended",
            format!(
                "Your account is now on the <strong>{}</strong> plan. Everything fit within the new limits, so nothing was archived.",
                target_plan.display_name()
            ),
            String::new(),
        ),
        SubscriptionEmail::GracePeriodReminder {
            target_plan,
            days_remaining,
            expires_at,
            usage,
            limits,
            excess,
        } => {
            let day_label = if *days_remaining == 1 { "day" } else { "days" };
            let body = format!(
                "{}{}{}",
                paragraph(&format!(
                    "You're using {} folders, {} calculators and {} contacts. The {} plan allows {} folders, {} calculators and {} contacts.",
                    usage.folders,
                    usage.calculators,
                    usage.contacts,
                    target_plan.display_name(),
                    limits.max_folders,
                    limits.max_calculators,
                    limits.max_contacts
                )),
                paragraph("Unless you reduce your usage or upgrade, the oldest items over the limit will be archived:"),
                counts_list(excess)
            );
            (
                format!("Reminder: {} {} left in your grace period", days_remaining, day_label),
                "Your grace period is ending soon",
                format!(
                    "Your account moves to the <strong>{}</strong> plan on {}.",
                    target_plan.display_name(),
                    format_date(*expires_at)
                ),
                body,
            )
        }
    };

    let html = wrap_email(app_origin, headline, &lead, &body, reason, None);
    (subject, html)
}

pub fn wrap_email(
    app_origin: &str,
    headline: &str,
    lead: &str,
    body_html: &str,
    reason: &str,
    footer_note: Option<&str>,
) -> String {
    let origin = origin_label(app_origin);

    let footer_note = footer_note
        .map(|note| {
            format!(
                r#"<p style="margin:8px 0 0;color:#4b5563;font-size:13px;">{}</p>"#,
                note
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <body style="background:#f8fafc;margin:0;padding:24px;font-family:Arial,Helvetica,sans-serif;">
    <div style="max-width:560px;margin:0 auto;background:#ffffff;border:1px solid #e5e7eb;border-radius:12px;padding:24px;">
      <div style="font-size:12px;letter-spacing:0.08em;text-transform:uppercase;color:#6b7280;">{brand} - {origin}</div>
      <h1 style="margin:12px 0 8px;font-size:22px;color:#111827;">{headline}</h1>
      <p style="margin:0 0 12px;font-size:15px;color:#111827;line-height:1.6;">{lead}</p>
      {body_html}
      <div style="margin-top:20px;padding-top:16px;border-top:1px solid #e5e7eb;">
        <p style="margin:0 0 6px;font-size:13px;color:#4b5563;">Why you got this email: {reason}.</p>
        {footer_note}
      </div>
      <p style="margin:14px 0 4px;font-size:12px;color:#9ca3af;">Sent by {brand} - {origin}</p>
    </div>
  </body>
</html>
"#,
        brand = BRAND_NAME,
        origin = origin,
        headline = headline,
        lead = lead,
        body_html = body_html,
        reason = reason,
        footer_note = footer_note,
    )
}
