//! Persistent key-value store for wizard state.
//!
//! Every browser session owns a namespace. Inside it, a handful of typed
//! entities are stored (answers, audit id, results, URL parameters), each as a
//! checksummed JSON document. The [`AuditRepository`] never fails: backend
//! errors are logged and read back as "absent", so the wizard stays usable when
//! persistence is broken.

use crate::checksum::ChecksummedValue;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    AnswerEntry, AnswerRecord, AuditResults, CompanyData, UrlParams, COMPANY_DATA_KEY,
    WEBSITE_URL_KEY,
};
use crate::webhook_models::OneOrMany;
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Logical entities persisted per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageKey {
    Answers,
    AuditId,
    AuditResult,
    UrlParams,
    // Written by earlier front-end versions; only ever cleared.
    LegacyCompanyData,
    LegacyBusinessDetails,
    LegacyReports,
}

impl StorageKey {
    fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Answers => "aiGrowthAuditUserData",
            StorageKey::AuditId => "auditId",
            StorageKey::AuditResult => "auditResult",
            StorageKey::UrlParams => "urlParams",
            StorageKey::LegacyCompanyData => "aiGrowthAuditCompanyData",
            StorageKey::LegacyBusinessDetails => "businessDetails",
            StorageKey::LegacyReports => "reportsData",
        }
    }
}

/// Keys removed when a new audit starts. URL parameters are deliberately absent.
const CLEARED_ON_START: [StorageKey; 6] = [
    StorageKey::Answers,
    StorageKey::AuditId,
    StorageKey::AuditResult,
    StorageKey::LegacyCompanyData,
    StorageKey::LegacyBusinessDetails,
    StorageKey::LegacyReports,
];

#[derive(Clone)]
enum Backend {
    Memory(Cache<String, String>),
    Postgres(PgPool),
}

/// Storage backend plus the per-namespace coordination primitives.
#[derive(Clone)]
pub struct Storage {
    backend: Backend,
    write_locks: Cache<String, Arc<Mutex<()>>>,
    company_data_signals: Cache<String, Arc<Notify>>,
}

impl Storage {
    /// In-process storage. Data lives as long as the process.
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory(
            Cache::builder().max_capacity(100_000).build(),
        ))
    }

    /// PostgreSQL storage over the `audit_storage` table (see `db::Database`).
    pub fn postgres(pool: PgPool) -> Self {
        Self::with_backend(Backend::Postgres(pool))
    }

    fn with_backend(backend: Backend) -> Self {
        let idle = Duration::from_secs(86_400);
        Self {
            backend,
            write_locks: Cache::builder()
                .time_to_idle(idle)
                .max_capacity(100_000)
                .build(),
            company_data_signals: Cache::builder()
                .time_to_idle(idle)
                .max_capacity(100_000)
                .build(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Postgres(_) => "postgres",
        }
    }

    /// Repository scoped to one session namespace. Repositories for the same
    /// namespace share their write lock and company-data signal.
    pub async fn repository(&self, namespace: &str) -> AuditRepository {
        let write_lock = self
            .write_locks
            .get_with(namespace.to_string(), async { Arc::new(Mutex::new(())) })
            .await;
        let company_data_stored = self
            .company_data_signals
            .get_with(namespace.to_string(), async { Arc::new(Notify::new()) })
            .await;

        AuditRepository {
            storage: self.clone(),
            namespace: namespace.to_string(),
            write_lock,
            company_data_stored,
        }
    }

    async fn read_raw(&self, namespace: &str, key: &str) -> Result<Option<String>, AppError> {
        match &self.backend {
            Backend::Memory(cache) => Ok(cache.get(&memory_key(namespace, key)).await),
            Backend::Postgres(pool) => sqlx::query_scalar::<_, String>(
                "SELECT value FROM audit_storage WHERE namespace = $1 AND key = $2",
            )
            .bind(namespace)
            .bind(key)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("reading {} for {}", key, namespace)),
        }
    }

    pub(crate) async fn write_raw(
        &self,
        namespace: &str,
        key: &str,
        value: String,
    ) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(cache) => {
                cache.insert(memory_key(namespace, key), value).await;
                Ok(())
            }
            Backend::Postgres(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO audit_storage (namespace, key, value, updated_at)
                    VALUES ($1, $2, $3, NOW())
                    ON CONFLICT (namespace, key)
                    DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                    "#,
                )
                .bind(namespace)
                .bind(key)
                .bind(value)
                .execute(pool)
                .await
                .with_context(|| format!("writing {} for {}", key, namespace))?;
                Ok(())
            }
        }
    }

    async fn remove_raw(&self, namespace: &str, key: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(cache) => {
                cache.invalidate(&memory_key(namespace, key)).await;
                Ok(())
            }
            Backend::Postgres(pool) => {
                sqlx::query("DELETE FROM audit_storage WHERE namespace = $1 AND key = $2")
                    .bind(namespace)
                    .bind(key)
                    .execute(pool)
                    .await
                    .with_context(|| format!("removing {} for {}", key, namespace))?;
                Ok(())
            }
        }
    }
}

fn memory_key(namespace: &str, key: &str) -> String {
    format!("{}:{}", namespace, key)
}

/// Typed access to one session's persisted wizard state.
#[derive(Clone)]
pub struct AuditRepository {
    storage: Storage,
    namespace: String,
    write_lock: Arc<Mutex<()>>,
    company_data_stored: Arc<Notify>,
}

impl AuditRepository {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn read<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let sealed = match self.storage.read_raw(&self.namespace, key.as_str()).await {
            Ok(Some(sealed)) => sealed,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Failed to retrieve {} from storage: {}", key.as_str(), e);
                return None;
            }
        };

        let data = ChecksummedValue::open(&sealed)?;
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Failed to parse stored {}: {}", key.as_str(), e);
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: StorageKey, value: &T) {
        let result: Result<(), AppError> = async {
            let data = serde_json::to_string(value)?;
            let sealed = ChecksummedValue::new(data).seal()?;
            self.storage
                .write_raw(&self.namespace, key.as_str(), sealed)
                .await
        }
        .await;

        if let Err(e) = result {
            tracing::error!("Failed to save {} to storage: {}", key.as_str(), e);
        }
    }

    async fn remove(&self, key: StorageKey) {
        if let Err(e) = self.storage.remove_raw(&self.namespace, key.as_str()).await {
            tracing::error!("Failed to clear {} from storage: {}", key.as_str(), e);
        }
    }

    // ============ Answers ============

    /// Replaces the entry for `key`, keeping every other answer.
    pub async fn put_answer(&self, key: &str, entry: AnswerEntry) {
        let _guard = self.write_lock.lock().await;
        let mut record = self.answers().await;
        record.insert(key.to_string(), entry);
        self.write(StorageKey::Answers, &record).await;
    }

    pub async fn answer(&self, key: &str) -> Option<AnswerEntry> {
        self.answers().await.remove(key)
    }

    /// Full answer record; empty when nothing is stored.
    pub async fn answers(&self) -> AnswerRecord {
        self.read(StorageKey::Answers).await.unwrap_or_default()
    }

    /// Removes answers, audit id, cached results and legacy keys. URL parameters
    /// survive so attribution carries over to the next audit.
    pub async fn clear_all(&self) {
        let _guard = self.write_lock.lock().await;
        for key in CLEARED_ON_START {
            self.remove(key).await;
        }
        tracing::debug!("Cleared audit data for {}", self.namespace);
    }

    // ============ Audit Session ============

    pub async fn save_audit_id(&self, audit_id: &str) {
        self.write(StorageKey::AuditId, &audit_id).await;
    }

    pub async fn audit_id(&self) -> Option<String> {
        self.read::<String>(StorageKey::AuditId)
            .await
            .filter(|id| !id.is_empty())
    }

    pub async fn save_url_params(&self, params: &UrlParams) {
        self.write(StorageKey::UrlParams, params).await;
    }

    pub async fn url_params(&self) -> UrlParams {
        self.read(StorageKey::UrlParams).await.unwrap_or_default()
    }

    // ============ Enrichment ============

    /// Stores the analysis result under `companyData` and wakes any waiter.
    pub async fn save_company_data(&self, data: CompanyData) {
        self.put_answer(COMPANY_DATA_KEY, AnswerEntry::company_data(data))
            .await;
        self.company_data_stored.notify_waiters();
    }

    pub async fn company_data(&self) -> Option<CompanyData> {
        self.answer(COMPANY_DATA_KEY).await.and_then(|entry| entry.data)
    }

    /// True only when the website step explicitly recorded `hasWebsite: false`.
    pub async fn has_declared_no_website(&self) -> bool {
        self.answer(WEBSITE_URL_KEY)
            .await
            .and_then(|entry| entry.has_website)
            == Some(false)
    }

    /// Signal fired each time company data is stored in this namespace.
    pub fn company_data_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.company_data_stored)
    }

    // ============ Results ============

    pub async fn save_results(&self, results: &AuditResults) {
        self.write(StorageKey::AuditResult, results).await;
    }

    /// Cached results; tolerates a stored singleton array.
    pub async fn results(&self) -> Option<AuditResults> {
        self.read::<OneOrMany<AuditResults>>(StorageKey::AuditResult)
            .await
            .and_then(OneOrMany::into_first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn repo() -> AuditRepository {
        Storage::in_memory().repository("browser-1").await
    }

    #[tokio::test]
    async fn test_put_replaces_whole_entry() {
        let repo = repo().await;
        repo.put_answer(
            WEBSITE_URL_KEY,
            AnswerEntry::new(json!("https://example.com")).with_has_website(true),
        )
        .await;
        repo.put_answer(WEBSITE_URL_KEY, AnswerEntry::new(json!("https://other.com")))
            .await;

        let entry = repo.answer(WEBSITE_URL_KEY).await.unwrap();
        assert_eq!(entry.answer, "https://other.com");
        assert_eq!(entry.has_website, None);
    }

    #[tokio::test]
    async fn test_record_merges_key_by_key() {
        let repo = repo().await;
        repo.put_answer("email", AnswerEntry::new(json!("ana@example.com")))
            .await;
        repo.put_answer("name", AnswerEntry::new(json!("Ana"))).await;

        let record = repo.answers().await;
        assert_eq!(record.len(), 2);
        assert_eq!(record["email"].answer, "ana@example.com");
        assert!(repo.answer("phoneNumber").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_namespace_reads_empty() {
        let repo = repo().await;
        assert!(repo.answers().await.is_empty());
        assert!(repo.audit_id().await.is_none());
        assert!(repo.url_params().await.is_empty());
        assert!(repo.results().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_all_preserves_url_params() {
        let repo = repo().await;
        let mut params = UrlParams::new();
        params.insert("utm_source".to_string(), "newsletter".to_string());
        repo.save_url_params(&params).await;
        repo.save_audit_id("abc123").await;
        repo.put_answer("email", AnswerEntry::new(json!("ana@example.com")))
            .await;
        repo.save_results(&AuditResults::default()).await;

        repo.clear_all().await;

        assert!(repo.answers().await.is_empty());
        assert!(repo.audit_id().await.is_none());
        assert!(repo.results().await.is_none());
        assert_eq!(repo.url_params().await, params);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let storage = Storage::in_memory();
        let a = storage.repository("a").await;
        let b = storage.repository("b").await;
        a.save_audit_id("only-a").await;
        assert!(b.audit_id().await.is_none());
    }

    #[tokio::test]
    async fn test_company_data_and_website_flag() {
        let repo = repo().await;
        assert!(!repo.has_declared_no_website().await);

        repo.put_answer(
            WEBSITE_URL_KEY,
            AnswerEntry::new(json!("")).with_has_website(false),
        )
        .await;
        assert!(repo.has_declared_no_website().await);

        repo.save_company_data(CompanyData {
            company_name: "Acme".to_string(),
            ..Default::default()
        })
        .await;
        assert_eq!(repo.company_data().await.unwrap().company_name, "Acme");
        // The website answer is still there next to companyData.
        assert!(repo.has_declared_no_website().await);
    }

    #[tokio::test]
    async fn test_corrupted_value_reads_as_absent() {
        let storage = Storage::in_memory();
        let repo = storage.repository("browser-1").await;
        storage
            .write_raw("browser-1", "auditId", "\"abc123\"".to_string())
            .await
            .unwrap();
        assert!(repo.audit_id().await.is_none());
    }

    #[tokio::test]
    async fn test_results_stored_as_array_are_normalized() {
        let storage = Storage::in_memory();
        let repo = storage.repository("browser-1").await;
        let data = json!([{"headline": "Strong fit", "status": "fit"}]).to_string();
        storage
            .write_raw(
                "browser-1",
                "auditResult",
                ChecksummedValue::new(data).seal().unwrap(),
            )
            .await
            .unwrap();

        let results = repo.results().await.unwrap();
        assert_eq!(results.headline, "Strong fit");
    }
}
