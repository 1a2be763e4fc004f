//! Attribution parameters (utm_*, gclid, ...) captured from the landing URL.
//!
//! The front end reports its query string once per page load. Non-empty
//! captures are persisted so a later visit without the query string still
//! carries attribution; on merge the current page's values win.

use crate::models::UrlParams;
use crate::storage::AuditRepository;
use url::form_urlencoded;

/// Parses a query string (with or without the leading `?`). Later duplicates win.
pub fn parse_query(query: &str) -> UrlParams {
    let query = query.trim().trim_start_matches('?');
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Stored parameters overlaid with the current ones.
pub fn merge(stored: &UrlParams, current: &UrlParams) -> UrlParams {
    let mut merged = stored.clone();
    merged.extend(current.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Persists `current` when it is non-empty and returns the merged view.
pub async fn capture(repo: &AuditRepository, current: &UrlParams) -> UrlParams {
    if !current.is_empty() {
        tracing::debug!(
            "Capturing {} URL parameter(s) for {}",
            current.len(),
            repo.namespace()
        );
        repo.save_url_params(current).await;
    }
    merge(&repo.url_params().await, current)
}

/// `?a=1&b=2`, or an empty string when there is nothing to encode.
pub fn query_string(params: &UrlParams) -> String {
    if params.is_empty() {
        return String::new();
    }
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    format!("?{}", encoded)
}

/// Appends `current` overlaid with `additional` to `base_url`, using `&` when
/// the URL already has a query.
pub fn append_to_url(base_url: &str, current: &UrlParams, additional: &UrlParams) -> String {
    let query = query_string(&merge(current, additional));
    match query.strip_prefix('?') {
        Some(encoded) if base_url.contains('?') => format!("{}&{}", base_url, encoded),
        Some(_) => format!("{}{}", base_url, query),
        None => base_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn params(pairs: &[(&str, &str)]) -> UrlParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_query_decodes_values() {
        let parsed = parse_query("?utm_source=google&utm_campaign=spring%20sale&ref=a+b");
        assert_eq!(parsed["utm_source"], "google");
        assert_eq!(parsed["utm_campaign"], "spring sale");
        assert_eq!(parsed["ref"], "a b");
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn test_current_params_take_precedence() {
        let stored = params(&[("utm_source", "newsletter"), ("gclid", "abc")]);
        let current = params(&[("utm_source", "google")]);
        let merged = merge(&stored, &current);
        assert_eq!(merged["utm_source"], "google");
        assert_eq!(merged["gclid"], "abc");
    }

    #[test]
    fn test_query_string_and_append() {
        assert_eq!(query_string(&UrlParams::new()), "");
        assert_eq!(query_string(&params(&[("a", "1")])), "?a=1");

        let current = params(&[("utm_source", "google")]);
        let extra = params(&[("step", "2")]);
        assert_eq!(
            append_to_url("https://audit.example.com/start", &current, &extra),
            "https://audit.example.com/start?step=2&utm_source=google"
        );
        assert_eq!(
            append_to_url("https://audit.example.com/?x=1", &current, &UrlParams::new()),
            "https://audit.example.com/?x=1&utm_source=google"
        );
        assert_eq!(
            append_to_url("https://audit.example.com", &UrlParams::new(), &UrlParams::new()),
            "https://audit.example.com"
        );
    }

    #[tokio::test]
    async fn test_capture_keeps_stored_params_on_bare_visit() {
        let repo = Storage::in_memory().repository("browser-1").await;

        let first = capture(&repo, &params(&[("utm_source", "newsletter")])).await;
        assert_eq!(first["utm_source"], "newsletter");

        // A later load without a query string must not wipe attribution.
        let second = capture(&repo, &UrlParams::new()).await;
        assert_eq!(second["utm_source"], "newsletter");

        let third = capture(&repo, &params(&[("utm_source", "google")])).await;
        assert_eq!(third["utm_source"], "google");
        assert_eq!(repo.url_params().await["utm_source"], "google");
    }
}
