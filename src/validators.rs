//! Pure field checks shared by live form feedback and pre-submit gating.

use crate::model::{ValidationForm, ValidationRequest};
use std::collections::BTreeMap;
use std::fmt;

/// Fields that must be non-empty before a run can start.
pub const REQUIRED_FIELDS: [&str; 4] = ["scenario_id", "ip_address", "port", "timeout"];

/// Why a form was refused before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    MissingFields(Vec<&'static str>),
    InvalidIp,
    InvalidPort,
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::MissingFields(_) => write!(f, "Please fill in all required fields"),
            FormError::InvalidIp => write!(f, "Invalid IP address format"),
            FormError::InvalidPort => write!(f, "Invalid port"),
        }
    }
}

impl std::error::Error for FormError {}

/// Dotted-quad shape: four groups of one to three digits.
pub fn is_valid_ip(value: &str) -> bool {
    let groups: Vec<&str> = value.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

pub fn is_valid_port(value: &str) -> bool {
    parse_port(value).is_some()
}

/// Trimmed port number in `1..=65535`.
pub fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok().filter(|p| *p >= 1)
}

/// Inline feedback for a single field. Empty input shows no error.
pub fn field_error(field: &str, value: &str) -> Option<&'static str> {
    if value.is_empty() {
        return None;
    }
    match field {
        "ip_address" if !is_valid_ip(value) => Some("Invalid IP address format"),
        "port" if !is_valid_port(value) => Some("Port must be between 1 and 65535"),
        _ => None,
    }
}

/// Check a submitted form and freeze it into the request body.
pub fn build_request(form: &ValidationForm) -> Result<ValidationRequest, FormError> {
    let values = [
        form.scenario_id.trim(),
        form.ip_address.trim(),
        form.port.trim(),
        form.timeout.trim(),
    ];
    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .zip(values.iter())
        .filter(|(_, v)| v.is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(FormError::MissingFields(missing));
    }

    let [scenario_id, ip_address, port, timeout] = values;
    if !is_valid_ip(ip_address) {
        return Err(FormError::InvalidIp);
    }
    let port = parse_port(port).ok_or(FormError::InvalidPort)?;

    let timeout = serde_json::from_str::<serde_json::Number>(timeout)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|_| serde_json::Value::String(timeout.to_string()));

    let extra: BTreeMap<String, String> = form
        .extra
        .iter()
        .filter(|(k, _)| !REQUIRED_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(ValidationRequest {
        scenario_id: scenario_id.to_string(),
        ip_address: ip_address.to_string(),
        port,
        timeout,
        extra,
    })
}
