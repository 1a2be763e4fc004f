use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============ Answer Record ============

/// Answer key under which the website analysis result is stored.
pub const COMPANY_DATA_KEY: &str = "companyData";
/// Answer key of the website step; carries the `hasWebsite` flag.
pub const WEBSITE_URL_KEY: &str = "websiteUrl";

/// Prefix of the per-question keys written by the deep questions step.
pub const DEEP_QUESTION_KEY_PREFIX: &str = "deepQuestion_";

/// Attribution parameters captured from the page query string.
pub type UrlParams = BTreeMap<String, String>;

/// Every collected answer, keyed by step key. Writes replace whole entries.
pub type AnswerRecord = BTreeMap<String, AnswerEntry>;

/// One stored answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    /// The answer value as submitted (string, number, list, objects).
    #[serde(default)]
    pub answer: Value,
    /// ISO-8601 time of the write.
    pub timestamp: String,
    /// Only set on the website step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_website: Option<bool>,
    /// Only set on the `companyData` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CompanyData>,
    /// Question text, for deep question answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl AnswerEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(answer: Value) -> Self {
        Self {
            answer,
            timestamp: now_iso8601(),
            has_website: None,
            data: None,
            question: None,
        }
    }

    pub fn with_has_website(mut self, has_website: bool) -> Self {
        self.has_website = Some(has_website);
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    /// Entry that wraps an enrichment payload (`answer` stays null).
    pub fn company_data(data: CompanyData) -> Self {
        Self {
            data: Some(data),
            ..Self::new(Value::Null)
        }
    }
}

/// Current UTC time as an ISO-8601 string with millisecond precision.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Key used to store the answer to deep question `id`.
pub fn deep_question_key(id: &Value) -> String {
    match id {
        Value::String(s) => format!("{}{}", DEEP_QUESTION_KEY_PREFIX, s),
        other => format!("{}{}", DEEP_QUESTION_KEY_PREFIX, other),
    }
}

// ============ Enrichment Payload ============

/// Company profile produced by the remote website analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyData {
    #[serde(deserialize_with = "null_as_default")]
    pub company_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub company_description: String,
    #[serde(deserialize_with = "lenient_number")]
    pub monthly_revenue: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub employee_count: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub niche: String,
    #[serde(deserialize_with = "null_as_default")]
    pub acquisition_channels: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub social_media: Vec<SocialMediaAccount>,
    #[serde(deserialize_with = "null_as_default")]
    pub main_offers: Vec<MainOffer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialMediaAccount {
    pub platform_name: String,
    pub username: String,
}

impl SocialMediaAccount {
    pub fn is_complete(&self) -> bool {
        !self.platform_name.trim().is_empty() && !self.username.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainOffer {
    pub name: String,
    pub description: String,
}

impl MainOffer {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.description.trim().is_empty()
    }
}

impl CompanyData {
    /// Decodes a raw analysis response object, applying the `nihce` fix first.
    pub fn from_raw(raw: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(normalize_company_payload(raw))
    }
}

/// Renames the upstream `nihce` typo to `niche` unless a non-empty `niche` exists.
///
/// When both keys are present and `niche` is populated, `nihce` is left alone and
/// ignored by decoding.
pub fn normalize_company_payload(mut raw: Value) -> Value {
    if let Value::Object(ref mut map) = raw {
        let niche_missing = match map.get("niche") {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        let has_typo = map
            .get("nihce")
            .map(|v| !v.is_null() && v.as_str() != Some(""))
            .unwrap_or(false);
        if niche_missing && has_typo {
            if let Some(value) = map.remove("nihce") {
                map.insert("niche".to_string(), value);
            }
        }
    }
    raw
}

/// Accepts numbers, numeric strings and null; anything unparseable becomes 0.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============ Deep Questions ============

/// A follow-up question generated by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepQuestion {
    /// Numeric in practice; kept as JSON to accept string ids too.
    pub id: Value,
    pub question: String,
}

// ============ Audit Results ============

/// Final report returned by `finishAudit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditResults {
    pub headline: String,
    pub status: String,
    pub gold_match: GoldMatch,
    pub customer_value: CustomerValue,
    pub what_this_requires: Vec<String>,
    pub alternatives_considered: Vec<Alternative>,
    pub risks_and_mitigation: Vec<String>,
    pub next_step: NextStep,
    /// Fields not modelled above, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldMatch {
    pub product: String,
    pub confidence_pct: f64,
    pub fit_reason: String,
    pub solves: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerValue {
    pub outcomes: Vec<String>,
    pub indicative_timeline: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alternative {
    pub product: String,
    pub why_not_primary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NextStep {
    pub action: String,
    pub what_you_get: String,
    pub commitment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Fit,
    Potential,
    NotRecommended,
}

impl AuditResults {
    pub fn fit_status(&self) -> FitStatus {
        match self.status.trim().to_lowercase().as_str() {
            "fit" => FitStatus::Fit,
            "potential" => FitStatus::Potential,
            _ => FitStatus::NotRecommended,
        }
    }

    /// Product name with underscores replaced for display.
    pub fn gold_match_label(&self) -> String {
        self.gold_match.product.replace('_', " ")
    }
}
