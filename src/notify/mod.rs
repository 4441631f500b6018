//! Operational notifications
//!
//! Every reconciliation branch reports to an operator channel. Delivery is
//! best-effort: a [`Notifier`] never surfaces errors to the caller.

pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
    /// Authentication failures
    Security,
    /// Settlement-only notices
    Settlement,
}

impl Severity {
    fn icon(&self) -> &'static str {
        match self {
            Severity::Success => "✅",
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
            Severity::Security => "🚨",
            Severity::Settlement => "💰",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Security => "security",
            Severity::Settlement => "settlement",
        };
        f.write_str(label)
    }
}

/// A titled message with ordered key/value details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub fields: Vec<(String, String)>,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }

    pub fn amount(self, name: impl Into<String>, amount: Decimal) -> Self {
        self.field(name, format_amount(amount))
    }

    /// Value of the first field called `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Render as Telegram HTML
    pub fn to_html(&self) -> String {
        let mut message = format!(
            "{} <b>{}</b>\n",
            self.severity.icon(),
            escape_html(&self.title)
        );
        for (name, value) in &self.fields {
            message.push_str(&format!(
                "\n• {}: <code>{}</code>",
                escape_html(name),
                escape_html(value)
            ));
        }
        message
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification);
}

/// Notifier used when no delivery channel is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) {
        info!(
            severity = %notification.severity,
            title = %notification.title,
            fields = ?notification.fields,
            "Notification (no delivery channel configured)"
        );
    }
}

/// Rupiah amount with dot grouping and no decimals, e.g. `Rp 1.234.567`
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("Rp -{}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_amount_grouping() {
        assert_eq!(format_amount(dec!(0)), "Rp 0");
        assert_eq!(format_amount(dec!(999)), "Rp 999");
        assert_eq!(format_amount(dec!(1000)), "Rp 1.000");
        assert_eq!(format_amount(dec!(1234567)), "Rp 1.234.567");
        assert_eq!(format_amount(dec!(90000.00)), "Rp 90.000");
    }

    #[test]
    fn test_format_amount_rounds_and_signs() {
        assert_eq!(format_amount(dec!(1499.5)), "Rp 1.500");
        assert_eq!(format_amount(dec!(-250000)), "Rp -250.000");
    }

    #[test]
    fn test_html_rendering_escapes_values() {
        let notification = Notification::new(Severity::Warning, "Callback Error")
            .field("Error", "expected <value> & more")
            .amount("Amount", dec!(15000));

        let html = notification.to_html();
        assert!(html.starts_with("⚠️ <b>Callback Error</b>"));
        assert!(html.contains("expected &lt;value&gt; &amp; more"));
        assert!(html.contains("• Amount: <code>Rp 15.000</code>"));
        assert_eq!(notification.get("Amount"), Some("Rp 15.000"));
    }
}
