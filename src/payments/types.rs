use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Identifier keys the gateway has used for a collect request, in precedence order.
pub const COLLECT_ID_ALIASES: &[&str] = &["collect_request_id", "collect_id", "order_id"];

/// Payment URL keys the gateway has used, in precedence order.
pub const PAYMENT_URL_ALIASES: &[&str] = &[
    "collect_request_url",
    "Collect_request_url",
    "payment_url",
    "redirect_url",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GatewayName {
    Edviron,
}

impl GatewayName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayName::Edviron => "Edviron",
        }
    }
}

impl std::fmt::Display for GatewayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /create-collect-request`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectRequest {
    pub school_id: String,
    /// Decimal amount rendered as a string, exactly as signed.
    pub amount: String,
    pub callback_url: String,
    pub sign: String,
}

/// Query of `GET /collect-request/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusPollRequest {
    pub collect_request_id: String,
    pub school_id: String,
    pub sign: String,
}

/// Normalized create-request answer. `raw` keeps the untouched body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectRequestResponse {
    pub collect_request_id: Option<String>,
    pub payment_url: Option<String>,
    pub raw: JsonValue,
}

impl CollectRequestResponse {
    pub fn from_raw(raw: JsonValue) -> Self {
        Self {
            collect_request_id: probe_aliases(&raw, COLLECT_ID_ALIASES),
            payment_url: probe_aliases(&raw, PAYMENT_URL_ALIASES),
            raw,
        }
    }
}

/// Return the first alias whose value is a non-empty string or a number.
///
/// Only top-level keys are probed. Numbers are rendered with their JSON text.
pub fn probe_aliases(body: &JsonValue, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match body.get(*key) {
        Some(JsonValue::String(value)) if !value.trim().is_empty() => Some(value.clone()),
        Some(JsonValue::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}
