use crate::circuit_breaker::{create_snapshot_circuit_breaker, SnapshotBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{AnswerRecord, AuditResults, CompanyData, DeepQuestion, UrlParams};
use crate::webhook_models::*;
use failsafe::futures::CircuitBreaker;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Client for the audit webhook workflows.
///
/// Every call is a JSON POST to `<base_url>/<path>` that carries the merged
/// URL attribution parameters.
#[derive(Clone)]
pub struct AuditClient {
    client: reqwest::Client,
    base_url: String,
    snapshot_breaker: SnapshotBreaker,
}

impl AuditClient {
    /// Creates a new `AuditClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Webhook base URL, with or without a trailing slash.
    /// * `timeout` - Optional transport timeout; `None` leaves requests unbounded.
    pub fn new(base_url: String, timeout: Option<Duration>) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create audit client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url,
            snapshot_breaker: create_snapshot_circuit_breaker(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(config.audit_api_base_url.clone(), config.request_timeout())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, AppError> {
        let url = self.endpoint(path);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("{} request failed: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "{} returned {}: {}",
                path, status, error_text
            )));
        }

        Ok(response)
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, AppError> {
        self.post(path, body).await?.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse {} response: {}", path, e))
        })
    }

    /// Opens a new audit and returns the issued audit id (if the workflow sent one).
    pub async fn start_audit(&self, url_params: &UrlParams) -> Result<Option<String>, AppError> {
        tracing::info!("Starting audit");

        let body: OneOrMany<StartAuditResponse> = self
            .post_json(START_AUDIT_PATH, &StartAuditRequest { url_params })
            .await?;

        let audit_id = body
            .into_first()
            .and_then(|r| r.audit_id)
            .filter(|id| !id.is_empty());

        match audit_id {
            Some(ref id) => tracing::info!("✓ Audit started with ID: {}", id),
            None => tracing::warn!("startAudit response carried no auditId"),
        }
        Ok(audit_id)
    }

    /// Runs the remote website analysis and returns the normalized company profile.
    pub async fn analyze_website(
        &self,
        website_url: &str,
        url_params: &UrlParams,
    ) -> Result<CompanyData, AppError> {
        tracing::info!("Requesting website analysis for {}", website_url);

        let body: OneOrMany<Value> = self
            .post_json(
                ANALYZE_WEBSITE_PATH,
                &AnalyzeWebsiteRequest {
                    website_url,
                    url_params,
                },
            )
            .await?;

        let raw = body.into_first().ok_or_else(|| {
            AppError::ExternalApiError("analyzeWebsite returned an empty array".to_string())
        })?;

        let company = CompanyData::from_raw(raw).map_err(|e| {
            AppError::ExternalApiError(format!("Unexpected analyzeWebsite payload: {}", e))
        })?;

        tracing::info!("✓ Company data received for {}", website_url);
        Ok(company)
    }

    /// Requests the follow-up questions generated from the answers so far.
    pub async fn request_deep_questions(
        &self,
        answers: &AnswerRecord,
        url_params: &UrlParams,
    ) -> Result<Vec<DeepQuestion>, AppError> {
        tracing::info!("Requesting deep questions ({} answers)", answers.len());

        let body: OneOrMany<DeepQuestion> = self
            .post_json(
                DEEP_QUESTIONS_PATH,
                &DeepQuestionsRequest {
                    answers,
                    url_params,
                },
            )
            .await?;

        let questions = body.into_vec();
        tracing::info!("✓ Received {} deep question(s)", questions.len());
        Ok(questions)
    }

    /// Submits the full record for scoring and returns the report.
    pub async fn finish_audit(
        &self,
        audit_id: Option<&str>,
        answers: &AnswerRecord,
        url_params: &UrlParams,
    ) -> Result<AuditResults, AppError> {
        tracing::info!("Finishing audit {:?}", audit_id);

        let body: OneOrMany<AuditResults> = self
            .post_json(
                FINISH_AUDIT_PATH,
                &FinishAuditRequest {
                    audit_id,
                    answers,
                    url_params,
                },
            )
            .await?;

        let results = body.into_first().ok_or_else(|| {
            AppError::ExternalApiError("finishAudit returned an empty array".to_string())
        })?;

        tracing::info!("✓ Audit results received (status: {})", results.status);
        Ok(results)
    }

    /// Pushes the accumulated state for live monitoring. The acknowledgement is
    /// ignored. Callers log and drop the error; this never affects the wizard.
    pub async fn push_state_snapshot(
        &self,
        audit_id: &str,
        user_data: &Value,
        url_params: &UrlParams,
    ) -> Result<(), AppError> {
        let request = StateSnapshotRequest {
            audit_id,
            user_data,
            url_params,
        };

        let result = self
            .snapshot_breaker
            .call(async {
                self.post(STATE_SNAPSHOT_PATH, &request).await?;
                Ok::<(), AppError>(())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!("State snapshot pushed for audit {}", audit_id);
                Ok(())
            }
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "state snapshot skipped: circuit open".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = AuditClient::new("https://hooks.example.com/webhook/".to_string(), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let with_slash =
            AuditClient::new("https://hooks.example.com/webhook/".to_string(), None).unwrap();
        let without_slash =
            AuditClient::new("https://hooks.example.com/webhook".to_string(), None).unwrap();
        let expected = "https://hooks.example.com/webhook/aiGrowth/startAudit";
        assert_eq!(with_slash.endpoint(START_AUDIT_PATH), expected);
        assert_eq!(without_slash.endpoint(START_AUDIT_PATH), expected);
    }
}
