//! Typed view of the gateway's webhook body.
//!
//! Every field is optional; presence is checked per field and only present
//! fields reach the status update.

use crate::database::status_repository::StatusUpdate;
use crate::payments::utils::deserialize_optional_amount;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub status: Option<JsonValue>,
    #[serde(default)]
    pub order_info: Option<OrderInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderInfo {
    /// The gateway's collect id, despite the name.
    #[serde(default, deserialize_with = "deserialize_order_id")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub order_amount: Option<BigDecimal>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub transaction_amount: Option<BigDecimal>,
    #[serde(default)]
    pub payment_mode: Option<String>,
    #[serde(default)]
    pub payment_details: Option<String>,
    #[serde(default)]
    pub bank_reference: Option<String>,
    #[serde(default)]
    pub payment_message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_time: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl WebhookPayload {
    pub fn parse(raw: &JsonValue) -> Result<Self, String> {
        serde_json::from_value(raw.clone()).map_err(|e| format!("unexpected payload shape: {}", e))
    }

    /// Split into the collect id and the fields to apply.
    pub fn into_update(self) -> Result<(String, StatusUpdate), String> {
        let info = self
            .order_info
            .ok_or_else(|| "missing order_info".to_string())?;

        let collect_id = info
            .order_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| "missing order_info.order_id".to_string())?;

        let payment_time = match info.payment_time.as_deref() {
            Some(text) if !text.trim().is_empty() => Some(
                parse_payment_time(text)
                    .ok_or_else(|| format!("unparseable order_info.payment_time '{}'", text))?,
            ),
            _ => None,
        };

        Ok((
            collect_id,
            StatusUpdate {
                order_amount: info.order_amount,
                transaction_amount: info.transaction_amount,
                payment_mode: info.payment_mode,
                payment_details: info.payment_details,
                bank_reference: info.bank_reference,
                payment_message: info.payment_message,
                status: info.status,
                error_message: info.error_message,
                payment_time,
            },
        ))
    }
}

/// RFC 3339, or a naive ISO date-time read as UTC.
pub fn parse_payment_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// `status` as logged: integer or numeric string, otherwise 0.
pub fn extract_status_code(raw: &JsonValue) -> i32 {
    let code = match raw.get("status") {
        Some(JsonValue::Number(n)) => n.as_i64(),
        Some(JsonValue::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    code.and_then(|c| i32::try_from(c).ok()).unwrap_or(0)
}

/// Collect ids arrive as strings or bare numbers.
fn order_id_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_order_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => order_id_text(&value).map(Some).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid order_id {}, expected a string or number",
                value
            ))
        }),
    }
}

/// `order_info.order_id` as logged, accepting strings and numbers.
pub fn extract_order_id(raw: &JsonValue) -> Option<String> {
    raw.pointer("/order_info/order_id").and_then(order_id_text)
}
