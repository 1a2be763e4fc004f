//! Waiting for the website analysis to land in the store.
//!
//! Steps prefilled from the company profile call [`wait_for_company_data`].
//! The wait is an ordinary future: it re-checks the store every poll interval,
//! wakes early when the repository signals a company-data write, resolves
//! immediately when the user declared no website, and gives up after the
//! optional timeout. Dropping the future (e.g. on client disconnect) cancels it.

use crate::config::Config;
use crate::models::{CompanyData, MainOffer, SocialMediaAccount};
use crate::storage::AuditRepository;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Field of [`CompanyData`] a step is prefilled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EnrichedField {
    CompanyName,
    CompanyDescription,
    MonthlyRevenue,
    EmployeeCount,
    Niche,
    AcquisitionChannels,
    SocialMedia,
    MainOffers,
}

impl EnrichedField {
    /// Value used when no profile is (or will be) available.
    pub fn default_value(&self) -> Value {
        match self {
            EnrichedField::CompanyName
            | EnrichedField::CompanyDescription
            | EnrichedField::Niche => json!(""),
            EnrichedField::MonthlyRevenue | EnrichedField::EmployeeCount => json!(0),
            EnrichedField::AcquisitionChannels
            | EnrichedField::SocialMedia
            | EnrichedField::MainOffers => json!([]),
        }
    }

    /// Extracts the field. List entries with an empty member are dropped and
    /// numbers are floored to integers.
    pub fn prefill(&self, data: &CompanyData) -> Value {
        match self {
            EnrichedField::CompanyName => json!(data.company_name),
            EnrichedField::CompanyDescription => json!(data.company_description),
            EnrichedField::MonthlyRevenue => json!(whole_number(data.monthly_revenue)),
            EnrichedField::EmployeeCount => json!(whole_number(data.employee_count)),
            EnrichedField::Niche => json!(data.niche),
            EnrichedField::AcquisitionChannels => json!(data
                .acquisition_channels
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()),
            EnrichedField::SocialMedia => json!(data
                .social_media
                .iter()
                .filter(|a| a.is_complete())
                .collect::<Vec<&SocialMediaAccount>>()),
            EnrichedField::MainOffers => json!(data
                .main_offers
                .iter()
                .filter(|o| o.is_complete())
                .collect::<Vec<&MainOffer>>()),
        }
    }
}

fn whole_number(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.floor() as u64
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` waits for as long as the caller keeps the future alive.
    pub timeout: Option<Duration>,
}

impl WaitPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.enrichment_wait_timeout(),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "camelCase")]
pub enum EnrichmentState {
    /// The user declared no website; defaults apply.
    NoWebsite,
    Ready(CompanyData),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentOutcome {
    #[serde(flatten)]
    pub state: EnrichmentState,
    /// Number of store checks performed, including the first.
    pub checks: u32,
}

impl EnrichmentOutcome {
    /// Value for `field`: extracted when ready, the default otherwise.
    pub fn resolve(&self, field: EnrichedField) -> Value {
        match &self.state {
            EnrichmentState::Ready(data) => field.prefill(data),
            EnrichmentState::NoWebsite | EnrichmentState::TimedOut => field.default_value(),
        }
    }
}

/// Waits until the store either says "no website" or holds company data.
pub async fn wait_for_company_data(
    repo: &AuditRepository,
    policy: WaitPolicy,
) -> EnrichmentOutcome {
    let mut checks = 0u32;

    let wait = async {
        let signal = repo.company_data_signal();
        loop {
            // Register interest before checking so a write between the check
            // and the select is not missed.
            let stored = signal.notified();
            tokio::pin!(stored);
            stored.as_mut().enable();

            checks += 1;
            if repo.has_declared_no_website().await {
                return EnrichmentState::NoWebsite;
            }
            if let Some(data) = repo.company_data().await {
                return EnrichmentState::Ready(data);
            }

            tracing::debug!(
                "⏳ Company data not ready for {} (check #{}), waiting",
                repo.namespace(),
                checks
            );
            tokio::select! {
                _ = tokio::time::sleep(policy.interval) => {}
                _ = &mut stored => {}
            }
        }
    };

    let state = match policy.timeout {
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(state) => state,
            Err(_) => {
                tracing::warn!(
                    "Enrichment wait for {} timed out after {:?}",
                    repo.namespace(),
                    limit
                );
                EnrichmentState::TimedOut
            }
        },
        None => wait.await,
    };

    EnrichmentOutcome { state, checks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerEntry, WEBSITE_URL_KEY};
    use crate::storage::Storage;

    fn profile() -> CompanyData {
        CompanyData {
            company_name: "Acme".to_string(),
            monthly_revenue: 350000.9,
            social_media: vec![
                SocialMediaAccount {
                    platform_name: "instagram".to_string(),
                    username: "@acme".to_string(),
                },
                SocialMediaAccount {
                    platform_name: "tiktok".to_string(),
                    username: "".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_prefill_and_defaults() {
        let data = profile();
        assert_eq!(EnrichedField::CompanyName.prefill(&data), json!("Acme"));
        assert_eq!(EnrichedField::MonthlyRevenue.prefill(&data), json!(350000));
        assert_eq!(
            EnrichedField::SocialMedia.prefill(&data),
            json!([{"platformName": "instagram", "username": "@acme"}])
        );
        assert_eq!(EnrichedField::Niche.default_value(), json!(""));
        assert_eq!(EnrichedField::EmployeeCount.default_value(), json!(0));
        assert_eq!(EnrichedField::MainOffers.default_value(), json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_website_resolves_on_first_check() {
        let repo = Storage::in_memory().repository("browser-1").await;
        repo.put_answer(
            WEBSITE_URL_KEY,
            AnswerEntry::new(json!("")).with_has_website(false),
        )
        .await;

        let outcome = wait_for_company_data(&repo, WaitPolicy::default()).await;
        assert_eq!(outcome.state, EnrichmentState::NoWebsite);
        assert_eq!(outcome.checks, 1);
        assert_eq!(outcome.resolve(EnrichedField::CompanyName), json!(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_data_resolves_immediately() {
        let repo = Storage::in_memory().repository("browser-1").await;
        repo.save_company_data(profile()).await;

        let outcome = wait_for_company_data(&repo, WaitPolicy::default()).await;
        assert_eq!(outcome.checks, 1);
        assert_eq!(outcome.resolve(EnrichedField::CompanyName), json!("Acme"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_data_is_picked_up_by_a_recheck() {
        let repo = Storage::in_memory().repository("browser-1").await;
        repo.put_answer(
            WEBSITE_URL_KEY,
            AnswerEntry::new(json!("https://example.com")).with_has_website(true),
        )
        .await;

        let writer = repo.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            writer.save_company_data(profile()).await;
        });

        let outcome = wait_for_company_data(&repo, WaitPolicy::default()).await;
        assert!(outcome.checks >= 2);
        assert!(matches!(outcome.state, EnrichmentState::Ready(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_defaults() {
        let repo = Storage::in_memory().repository("browser-1").await;
        let policy = WaitPolicy {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(5)),
        };

        let outcome = wait_for_company_data(&repo, policy).await;
        assert_eq!(outcome.state, EnrichmentState::TimedOut);
        assert!(outcome.checks >= 5);
        assert_eq!(outcome.resolve(EnrichedField::MonthlyRevenue), json!(0));
    }
}
