//! Request and response shapes of the audit webhook API.
//!
//! The upstream workflows answer either with a bare object or with a
//! one-element array wrapping it, so every response goes through [`OneOrMany`].

use crate::models::{AnswerRecord, UrlParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Webhook path suffixes, appended to the configured base URL.
pub const START_AUDIT_PATH: &str = "aiGrowth/startAudit";
pub const ANALYZE_WEBSITE_PATH: &str = "aiGrowth/analyzeWebsite";
pub const DEEP_QUESTIONS_PATH: &str = "aiGrowth/deepQuestions";
pub const FINISH_AUDIT_PATH: &str = "aiGrowth/finishAudit";
pub const STATE_SNAPSHOT_PATH: &str = "aiGrowth/bolt";

/// Response body that can be a single object or an array of them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// First element for arrays, the object itself otherwise.
    pub fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::Many(items) => items.into_iter().next(),
            OneOrMany::One(item) => Some(item),
        }
    }

    /// All elements, wrapping a single object into a one-element list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuditRequest<'a> {
    pub url_params: &'a UrlParams,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuditResponse {
    #[serde(default)]
    pub audit_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeWebsiteRequest<'a> {
    pub website_url: &'a str,
    pub url_params: &'a UrlParams,
}

/// `{ ...answerRecord, urlParams }`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepQuestionsRequest<'a> {
    #[serde(flatten)]
    pub answers: &'a AnswerRecord,
    pub url_params: &'a UrlParams,
}

/// `{ auditId, ...answerRecord, urlParams }`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishAuditRequest<'a> {
    pub audit_id: Option<&'a str>,
    #[serde(flatten)]
    pub answers: &'a AnswerRecord,
    pub url_params: &'a UrlParams,
}

/// `{ auditId, userData, urlParams }`; `userData` is usually the answer record,
/// optionally extended (e.g. with a CTA click).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshotRequest<'a> {
    pub audit_id: &'a str,
    pub user_data: &'a Value,
    pub url_params: &'a UrlParams,
}
