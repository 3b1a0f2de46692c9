use axum::http::HeaderMap;

const CONTROL_SECRET_HEADER: &str = "bridge-control-secret";

/// Extracts the caller-presented control secret, accepting either an
/// `Authorization: Bearer <secret>` header or the `bridge-control-secret`
/// header, since operators script against both conventions.
pub fn presented_secret(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(raw) = value.to_str() {
            if let Some(token) = raw.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    if let Some(value) = headers.get(CONTROL_SECRET_HEADER) {
        if let Ok(raw) = value.to_str() {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// `true` if `presented` matches `configured`. Both must be `Some`.
pub fn secret_matches(configured: Option<&str>, presented: Option<&str>) -> bool {
    match (configured, presented) {
        (Some(expected), Some(observed)) => expected == observed,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn unit_presented_secret_reads_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer s3cr3t"),
        );
        assert_eq!(presented_secret(&headers).as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn unit_presented_secret_reads_custom_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTROL_SECRET_HEADER, HeaderValue::from_static("s3cr3t"));
        assert_eq!(presented_secret(&headers).as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn unit_presented_secret_absent_without_headers() {
        let headers = HeaderMap::new();
        assert_eq!(presented_secret(&headers), None);
    }

    #[test]
    fn functional_secret_matches_requires_both_present_and_equal() {
        assert!(secret_matches(Some("s3cr3t"), Some("s3cr3t")));
        assert!(!secret_matches(Some("s3cr3t"), Some("other")));
        assert!(!secret_matches(None, Some("s3cr3t")));
        assert!(!secret_matches(Some("s3cr3t"), None));
    }
}
