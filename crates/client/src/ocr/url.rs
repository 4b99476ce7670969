//! Endpoint URL handling for the OCR service.

/// Error type for endpoint URL failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Normalize a service base URL so relative routes join beneath it.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to http:// if missing (services are usually local)
/// 3. Drop query and fragment
/// 4. Ensure the path ends with `/`
pub fn base_url(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("http://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_query(None);
    parsed.set_fragment(None);
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }

    Ok(parsed)
}

/// Join a route (`ocr`, `version`) onto a normalized base.
pub fn route(base: &url::Url, name: &str) -> Result<url::Url, UrlError> {
    base.join(name.trim_start_matches('/'))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_adds_trailing_slash() {
        let url = base_url("http://localhost:9000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/");

        let url = base_url("https://ocr.internal/api/v1").unwrap();
        assert_eq!(url.path(), "/api/v1/");
    }

    #[test]
    fn test_base_url_default_scheme() {
        let url = base_url("localhost:9000").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn test_base_url_drops_query_and_fragment() {
        let url = base_url("http://localhost:9000/api?x=1#top").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/api/");
    }

    #[test]
    fn test_base_url_rejects_bad_input() {
        assert!(matches!(base_url("   "), Err(UrlError::Empty)));
        assert!(matches!(base_url("ftp://host/"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_route_stays_under_base() {
        let base = base_url("https://ocr.internal/api/v1").unwrap();
        assert_eq!(route(&base, "ocr").unwrap().as_str(), "https://ocr.internal/api/v1/ocr");
        assert_eq!(route(&base, "/version").unwrap().as_str(), "https://ocr.internal/api/v1/version");
    }
}
