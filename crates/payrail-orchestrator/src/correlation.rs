//! Correlation id extraction. Grounded on `shared/correlation.py`'s
//! `generate_correlation_id`/`get_correlation_id`: a per-request value,
//! generated if the caller didn't supply one, threaded explicitly through
//! the call chain rather than a process-global context var (the idiomatic
//! translation noted in the design notes for "async control flow").

use axum::http::HeaderMap;
use payrail_types::new_correlation_id;

pub fn correlation_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_correlation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_supplied_header_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", "corr_abc".parse().unwrap());
        assert_eq!(correlation_id_from_headers(&headers), "corr_abc");
    }

    #[test]
    fn blank_header_is_treated_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", "   ".parse().unwrap());
        assert_ne!(correlation_id_from_headers(&headers), "   ");
    }

    #[test]
    fn generates_one_when_missing() {
        let headers = HeaderMap::new();
        let first = correlation_id_from_headers(&headers);
        let second = correlation_id_from_headers(&headers);
        assert_ne!(first, second);
    }
}
