//! One browser's audit run.
//!
//! A [`WizardSession`] ties the sequencer to the persisted answers, the audit
//! webhook client and the enrichment wait. Every submission is validated
//! before anything is written; a failed step leaves both the store and the
//! sequencer position untouched.

use crate::audit_client::AuditClient;
use crate::config::Config;
use crate::enrichment_wait::{wait_for_company_data, EnrichedField, EnrichmentOutcome, WaitPolicy};
use crate::errors::AppError;
use crate::models::{
    deep_question_key, now_iso8601, AnswerEntry, AnswerRecord, AuditResults, DeepQuestion,
    UrlParams,
};
use crate::sequencer::{Progress, Sequencer, StepId, StepSequence, StepView};
use crate::storage::AuditRepository;
use crate::url_params::append_to_url;
use crate::validation::validate_answer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone)]
pub struct WizardOptions {
    pub sequence: StepSequence,
    pub wait_policy: WaitPolicy,
    pub dev_navigation: bool,
}

impl WizardOptions {
    pub fn from_config(config: &Config) -> Self {
        let sequence = if config.extended_steps {
            StepSequence::extended()
        } else {
            StepSequence::default_sequence()
        };
        let sequence = if config.skip_enrichment_without_website {
            sequence.skip_enrichment_without_website()
        } else {
            sequence
        };

        Self {
            sequence,
            wait_policy: WaitPolicy::from_config(config),
            dev_navigation: config.dev_navigation,
        }
    }
}

impl Default for WizardOptions {
    fn default() -> Self {
        Self {
            sequence: StepSequence::default_sequence(),
            wait_policy: WaitPolicy::default(),
            dev_navigation: false,
        }
    }
}

/// Answer for the current step as sent by the front end.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    #[serde(default)]
    pub value: Value,
    /// Website step only. Defaults to true.
    #[serde(default)]
    pub has_website: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub step: StepView,
    pub progress: Progress,
    pub audit_id: Option<String>,
    pub answers: AnswerRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepQuestionView {
    pub id: Value,
    pub question: String,
    /// Previously saved answer, if any.
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prefill {
    pub field: EnrichedField,
    pub value: Value,
    #[serde(flatten)]
    pub outcome: EnrichmentOutcome,
}

/// Enrichment wait detached from the session so it can run without
/// holding the session lock.
pub struct PrefillTask {
    repo: AuditRepository,
    field: EnrichedField,
    policy: WaitPolicy,
}

impl PrefillTask {
    pub async fn run(self) -> Prefill {
        let outcome = wait_for_company_data(&self.repo, self.policy).await;
        Prefill {
            field: self.field,
            value: outcome.resolve(self.field),
            outcome,
        }
    }
}

pub struct WizardSession {
    sequencer: Sequencer,
    repo: AuditRepository,
    client: AuditClient,
    options: WizardOptions,
    url_params: UrlParams,
    questions: Vec<DeepQuestion>,
}

impl WizardSession {
    pub fn new(
        repo: AuditRepository,
        client: AuditClient,
        options: WizardOptions,
        url_params: UrlParams,
    ) -> Self {
        Self {
            sequencer: Sequencer::new(options.sequence.clone()),
            repo,
            client,
            options,
            url_params,
            questions: Vec::new(),
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn repository(&self) -> &AuditRepository {
        &self.repo
    }

    pub fn url_params(&self) -> &UrlParams {
        &self.url_params
    }

    pub fn set_url_params(&mut self, url_params: UrlParams) {
        self.url_params = url_params;
    }

    pub async fn view(&self) -> SessionView {
        SessionView {
            session_id: self.repo.namespace().to_string(),
            step: self.sequencer.current(),
            progress: self.sequencer.progress(),
            audit_id: self.repo.audit_id().await,
            answers: self.repo.answers().await,
        }
    }

    fn require_step(&self, expected: StepId) -> Result<(), AppError> {
        match self.sequencer.current_step() {
            Some(step) if step == expected => Ok(()),
            other => Err(AppError::BadRequest(format!(
                "Expected step '{}', session is at {:?}",
                expected, other
            ))),
        }
    }

    /// Pushes the answer record to the snapshot webhook in the background.
    /// Skipped when no audit id was issued.
    fn spawn_snapshot(&self) {
        let client = self.client.clone();
        let repo = self.repo.clone();
        let url_params = self.url_params.clone();

        tokio::spawn(async move {
            let Some(audit_id) = repo.audit_id().await else {
                tracing::warn!("No auditId for {}, skipping state snapshot", repo.namespace());
                return;
            };

            let user_data = match serde_json::to_value(repo.answers().await) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!("Failed to serialize answers for snapshot: {}", e);
                    return;
                }
            };

            if let Err(e) = client
                .push_state_snapshot(&audit_id, &user_data, &url_params)
                .await
            {
                tracing::warn!("State snapshot failed for audit {}: {}", audit_id, e);
            }
        });
    }

    fn spawn_website_analysis(&self, website_url: String) {
        let client = self.client.clone();
        let repo = self.repo.clone();
        let url_params = self.url_params.clone();

        tokio::spawn(async move {
            match client.analyze_website(&website_url, &url_params).await {
                Ok(data) => {
                    repo.save_company_data(data).await;
                    tracing::info!("✓ Company data stored for {}", repo.namespace());
                }
                Err(e) => {
                    tracing::error!("Website analysis failed for {}: {}", website_url, e);
                }
            }
        });
    }

    /// Begins a new audit: wipes previous answers, requests an audit id and
    /// moves past the welcome step. A failing `startAudit` does not block.
    pub async fn start(&mut self) {
        self.repo.clear_all().await;
        self.questions.clear();
        self.sequencer = Sequencer::new(self.options.sequence.clone());

        match self.client.start_audit(&self.url_params).await {
            Ok(Some(audit_id)) => self.repo.save_audit_id(&audit_id).await,
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Failed to start audit: {}", e);
                self.repo.clear_all().await;
            }
        }

        self.sequencer.advance(Map::new());
        let answers = self.repo.answers().await;
        self.sequencer.settle_forward(&answers);
    }

    /// Validates and stores the answer for the current step, then advances.
    pub async fn submit_answer(&mut self, submission: AnswerSubmission) -> Result<(), AppError> {
        let step = self
            .sequencer
            .current_step()
            .ok_or_else(|| AppError::BadRequest("Audit is already complete".to_string()))?;
        let key = step.answer_key().ok_or_else(|| {
            AppError::BadRequest(format!("Step '{}' does not take a direct answer", step))
        })?;

        let entry = if step == StepId::WebsiteUrl {
            let has_website = submission.has_website.unwrap_or(true);
            if has_website {
                let url = validate_answer(step, &submission.value)?;
                AnswerEntry::new(url).with_has_website(true)
            } else {
                AnswerEntry::new(json!("")).with_has_website(false)
            }
        } else {
            AnswerEntry::new(validate_answer(step, &submission.value)?)
        };

        tracing::info!("📝 {} answered {}", self.repo.namespace(), key);
        let answer = entry.answer.clone();
        let website = match (step, entry.has_website) {
            (StepId::WebsiteUrl, Some(true)) => answer.as_str().map(str::to_string),
            _ => None,
        };

        self.repo.put_answer(key, entry).await;
        if let Some(url) = website {
            self.spawn_website_analysis(url);
        }
        self.spawn_snapshot();

        let mut partial = Map::new();
        partial.insert(key.to_string(), answer);
        self.sequencer.advance(partial);
        let answers = self.repo.answers().await;
        self.sequencer.settle_forward(&answers);
        Ok(())
    }

    pub async fn back(&mut self) {
        self.sequencer.retreat();
        let answers = self.repo.answers().await;
        self.sequencer.settle_backward(&answers);
    }

    /// Operator navigation; refused unless dev navigation is enabled.
    pub fn jump_to(&mut self, index: usize) -> Result<(), AppError> {
        if !self.options.dev_navigation {
            return Err(AppError::Forbidden(
                "Step navigation is disabled".to_string(),
            ));
        }
        self.sequencer.jump_to(index);
        tracing::debug!("Jumped to step {}", self.sequencer.index());
        Ok(())
    }

    /// Enrichment wait for the current step's company field.
    pub fn prefill_task(&self) -> Result<PrefillTask, AppError> {
        let field = self
            .sequencer
            .current_step()
            .and_then(|step| step.enriched_field())
            .ok_or_else(|| {
                AppError::BadRequest("Current step is not prefilled from company data".to_string())
            })?;

        Ok(PrefillTask {
            repo: self.repo.clone(),
            field,
            policy: self.options.wait_policy,
        })
    }

    /// Fetches the follow-up questions, paired with any answers saved earlier.
    pub async fn load_deep_questions(&mut self) -> Result<Vec<DeepQuestionView>, AppError> {
        self.require_step(StepId::DeepQuestions)?;

        let answers = self.repo.answers().await;
        let questions = self
            .client
            .request_deep_questions(&answers, &self.url_params)
            .await?;
        if questions.is_empty() {
            return Err(AppError::ExternalApiError(
                "No questions received from the server".to_string(),
            ));
        }

        let views = questions
            .iter()
            .map(|q| DeepQuestionView {
                id: q.id.clone(),
                question: q.question.clone(),
                answer: answers
                    .get(&deep_question_key(&q.id))
                    .and_then(|entry| entry.answer.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            })
            .collect();

        self.questions = questions;
        Ok(views)
    }

    pub async fn answer_deep_question(
        &mut self,
        question_id: &str,
        text: &str,
    ) -> Result<(), AppError> {
        self.require_step(StepId::DeepQuestions)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Answer cannot be empty".to_string()));
        }

        let question = self
            .questions
            .iter()
            .find(|q| id_matches(&q.id, question_id))
            .ok_or_else(|| AppError::NotFound(format!("Deep question {}", question_id)))?;

        let key = deep_question_key(&question.id);
        let entry = AnswerEntry::new(json!(text)).with_question(question.question.clone());
        self.repo.put_answer(&key, entry).await;
        self.spawn_snapshot();
        Ok(())
    }

    /// Submits everything for scoring once every loaded deep question has an
    /// answer. On failure the step is unchanged.
    pub async fn finish(&mut self) -> Result<AuditResults, AppError> {
        self.require_step(StepId::DeepQuestions)?;
        if self.questions.is_empty() {
            return Err(AppError::BadRequest(
                "Deep questions have not been loaded".to_string(),
            ));
        }

        let answers = self.repo.answers().await;
        let unanswered = self
            .questions
            .iter()
            .filter(|q| {
                answers
                    .get(&deep_question_key(&q.id))
                    .and_then(|entry| entry.answer.as_str())
                    .map_or(true, |s| s.trim().is_empty())
            })
            .count();
        if unanswered > 0 {
            return Err(AppError::BadRequest(format!(
                "{} deep question(s) still unanswered",
                unanswered
            )));
        }

        let audit_id = self.repo.audit_id().await;
        let results = self
            .client
            .finish_audit(audit_id.as_deref(), &answers, &self.url_params)
            .await?;

        self.repo.save_results(&results).await;
        self.sequencer.finish(results.clone());
        Ok(results)
    }

    /// Stored results survive a reload; the in-memory ones cover a broken store.
    pub async fn results(&self) -> Option<AuditResults> {
        match self.repo.results().await {
            Some(results) => Some(results),
            None => self.sequencer.results().cloned(),
        }
    }

    /// Reports the call-to-action click and moves on to the thank-you step.
    /// When the CTA links somewhere, returns that link carrying the session's
    /// attribution parameters.
    pub async fn record_cta(
        &mut self,
        action: Option<String>,
        link: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        self.require_step(StepId::Results)?;

        let action = match action {
            Some(action) => action,
            None => self
                .results()
                .await
                .map(|r| r.next_step.action)
                .unwrap_or_default(),
        };

        if let Some(audit_id) = self.repo.audit_id().await {
            let mut user_data = serde_json::to_value(self.repo.answers().await)?;
            if let Value::Object(map) = &mut user_data {
                map.insert(
                    "cta_clicked".to_string(),
                    json!({
                        "action": action,
                        "timestamp": now_iso8601(),
                        "page": "results",
                    }),
                );
            }
            if let Err(e) = self
                .client
                .push_state_snapshot(&audit_id, &user_data, &self.url_params)
                .await
            {
                tracing::error!("Failed to send CTA click: {}", e);
            }
        } else {
            tracing::warn!("No auditId, CTA click not reported");
        }

        self.sequencer.advance(Map::new());
        Ok(link.map(|url| append_to_url(url, &self.url_params, &UrlParams::new())))
    }
}

fn id_matches(id: &Value, raw: &str) -> bool {
    match id {
        Value::String(s) => s == raw,
        other => other.to_string() == raw,
    }
}
