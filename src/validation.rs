//! Input predicates and normalizers for wizard answers.
//!
//! Every answer is validated here before anything is written to the store, so
//! a rejected submission leaves both the store and the step index untouched.

use crate::errors::AppError;
use crate::models::{MainOffer, SocialMediaAccount};
use crate::sequencer::StepId;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Validate email address
///
/// Accepts `local@domain.tld` with no whitespace and exactly one `@` per side;
/// surrounding whitespace is ignored.
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

    match regex {
        Some(re) => re.is_match(email.trim()),
        None => false,
    }
}

/// Prefixes `https://` when the input carries no scheme.
pub fn normalize_website_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// True when the (already normalized) string parses as an absolute URL.
pub fn is_valid_website_url(url: &str) -> bool {
    url::Url::parse(url.trim()).is_ok()
}

/// Normalize a phone number
///
/// Any non-empty input is accepted. Numbers that parse as valid Brazilian
/// numbers are returned in E.164 (+5511987654321); anything else is kept as
/// typed (trimmed).
pub fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Phone number is required".to_string()));
    }

    match phonenumber::parse(Some(CountryId::BR), trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("✓ Valid BR phone: {} → {}", trimmed, formatted);
            Ok(formatted)
        }
        _ => {
            tracing::debug!("Keeping phone as typed: {}", trimmed);
            Ok(trimmed.to_string())
        }
    }
}

/// Parses a revenue input such as `R$ 350.000` or `350000.75`.
///
/// Everything except digits and dots is dropped, the longest float prefix is
/// read and floored. Unparseable input yields 0.
pub fn parse_revenue_input(input: &str) -> u64 {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    // Float prefix: digits, at most one dot, more digits.
    let mut seen_dot = false;
    let prefix: String = cleaned
        .chars()
        .take_while(|c| {
            if *c == '.' {
                if seen_dot {
                    return false;
                }
                seen_dot = true;
            }
            true
        })
        .collect();

    match prefix.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value.floor() as u64,
        _ => 0,
    }
}

/// Compact revenue label: `0`, `950`, `350K`, `2M`, `1B` (always floored).
pub fn format_revenue(amount: u64) -> String {
    match amount {
        0 => "0".to_string(),
        a if a < 1_000 => a.to_string(),
        a if a < 1_000_000 => format!("{}K", a / 1_000),
        a if a < 1_000_000_000 => format!("{}M", a / 1_000_000),
        a => format!("{}B", a / 1_000_000_000),
    }
}

/// Leading-integer parse (`"25 people"` → 25). Invalid input yields 0.
pub fn parse_team_size(input: &str) -> u64 {
    let digits: String = input
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn required_text(value: &Value, field: &str) -> Result<String, AppError> {
    let text = value.as_str().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(text.to_string())
}

fn numeric_answer(value: &Value, parse: fn(&str) -> u64) -> Result<u64, AppError> {
    match value {
        Value::Number(n) => Ok(n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.floor() as u64))
            .unwrap_or(0)),
        Value::String(s) => Ok(parse(s)),
        Value::Null => Ok(0),
        other => Err(AppError::BadRequest(format!(
            "Expected a number, got {}",
            other
        ))),
    }
}

fn string_list(value: &Value) -> Result<Vec<String>, AppError> {
    let items: Vec<String> = serde_json::from_value(value.clone())
        .map_err(|_| AppError::BadRequest("Expected a list of strings".to_string()))?;
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Validates and normalizes the answer for `step`.
///
/// Returns the value to store. The website step is handled by the wizard
/// itself because it also records the `hasWebsite` flag.
pub fn validate_answer(step: StepId, value: &Value) -> Result<Value, AppError> {
    match step {
        StepId::Email => {
            let email = value.as_str().map(str::trim).unwrap_or_default();
            if !is_valid_email(email) {
                tracing::warn!("❌ Invalid email format: {}", email);
                return Err(AppError::BadRequest("Invalid email address".to_string()));
            }
            Ok(json!(email))
        }
        StepId::WebsiteUrl => {
            let url = normalize_website_url(value.as_str().unwrap_or_default());
            if !is_valid_website_url(&url) {
                return Err(AppError::BadRequest("Invalid website URL".to_string()));
            }
            Ok(json!(url))
        }
        StepId::PhoneNumber => {
            let raw = value.as_str().unwrap_or_default();
            Ok(json!(normalize_phone(raw)?))
        }
        StepId::Name => Ok(json!(required_text(value, "Name")?)),
        StepId::CompanyName => Ok(json!(required_text(value, "Company name")?)),
        StepId::CompanyDescription => {
            Ok(json!(required_text(value, "Company description")?))
        }
        StepId::Niche => Ok(json!(required_text(value, "Niche")?)),
        StepId::UserRole => Ok(json!(required_text(value, "Role")?)),
        StepId::GrowthGoal => Ok(json!(required_text(value, "Growth goal")?)),
        StepId::MonthlyRevenue => Ok(json!(numeric_answer(value, parse_revenue_input)?)),
        StepId::EmployeeCount => Ok(json!(numeric_answer(value, parse_team_size)?)),
        StepId::AcquisitionChannels => Ok(json!(string_list(value)?)),
        StepId::SocialMedia => {
            let accounts: Vec<SocialMediaAccount> = serde_json::from_value(value.clone())
                .map_err(|_| {
                    AppError::BadRequest("Expected a list of social media accounts".to_string())
                })?;
            let accounts: Vec<SocialMediaAccount> = accounts
                .into_iter()
                .filter(SocialMediaAccount::is_complete)
                .collect();
            Ok(json!(accounts))
        }
        StepId::MainOffers => {
            let offers: Vec<MainOffer> = serde_json::from_value(value.clone())
                .map_err(|_| AppError::BadRequest("Expected a list of offers".to_string()))?;
            let offers: Vec<MainOffer> =
                offers.into_iter().filter(MainOffer::is_complete).collect();
            Ok(json!(offers))
        }
        StepId::Welcome | StepId::DeepQuestions | StepId::Results | StepId::ThankYou => {
            Err(AppError::BadRequest(format!(
                "Step '{}' does not take a direct answer",
                step
            )))
        }
    }
}
