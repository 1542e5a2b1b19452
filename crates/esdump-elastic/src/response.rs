//! Response bodies and error classification

use esdump_core::{ExportError, Page};
use serde::Deserialize;
use serde_json::value::RawValue;

/// Longest raw body excerpt carried in an error message
const MAX_BODY_EXCERPT: usize = 300;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    pub scroll_id: Option<String>,
    #[serde(rename = "_shards", default)]
    pub shards: Option<ShardStats>,
    pub hits: Hits,
}

#[derive(Debug, Deserialize)]
pub struct ShardStats {
    pub total: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<TotalHits>,
    pub hits: Vec<Hit>,
}

/// `hits.total`: a bare number before 7.0, an object with relation after
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Legacy(u64),
    Tracked {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
}

impl TotalHits {
    /// Exact total, or `None` when the service only reports a lower bound
    pub fn exact(&self) -> Option<u64> {
        match self {
            Self::Legacy(n) => Some(*n),
            Self::Tracked { value, relation } => match relation.as_deref() {
                Some("gte") => None,
                _ => Some(*value),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source")]
    pub source: Box<RawValue>,
}

#[derive(Debug, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct CatIndex {
    pub index: String,
}

impl SearchResponse {
    /// Convert into a page; an empty hit list marks the end of the slice.
    pub fn into_page(self, label: &str) -> Page {
        if let Some(shards) = &self.shards {
            if shards.failed > 0 {
                log::warn!(
                    "{label}: {} of {} shards failed, page may be incomplete",
                    shards.failed,
                    shards.total
                );
            }
        }
        let total_hint = self.hits.total.as_ref().and_then(TotalHits::exact);
        let documents: Vec<Box<RawValue>> =
            self.hits.hits.into_iter().map(|h| h.source).collect();
        Page {
            exhausted: documents.is_empty(),
            documents,
            cursor: self.scroll_id,
            total_hint,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    root_cause: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detail(ErrorDetail),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorField,
}

/// (type, reason) of an error body, preferring the first root cause
fn error_detail(body: &[u8]) -> (Option<String>, Option<String>) {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorField::Detail(mut detail),
        }) => {
            if detail.root_cause.is_empty() {
                (detail.kind, detail.reason)
            } else {
                let root = detail.root_cause.swap_remove(0);
                (root.kind.or(detail.kind), root.reason.or(detail.reason))
            }
        }
        Ok(ErrorBody {
            error: ErrorField::Text(text),
        }) => (None, Some(text)),
        Err(_) => (None, None),
    }
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.len() <= MAX_BODY_EXCERPT {
        return text.to_string();
    }
    let mut end = MAX_BODY_EXCERPT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn is_slice_rejection(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    reason.contains("slice") || reason.contains("max must be greater than")
}

/// Classify a non-success response for a request against `index`.
pub fn classify(status: u16, body: &[u8], index: &str) -> ExportError {
    let (kind, reason) = error_detail(body);
    let message = reason.unwrap_or_else(|| body_excerpt(body));
    match (status, kind.as_deref()) {
        (401 | 403, _) => ExportError::Authentication(message),
        (404, Some("index_not_found_exception")) => ExportError::IndexNotFound(index.to_string()),
        (400, _) if is_slice_rejection(&message) => ExportError::SliceLimit(message),
        _ => ExportError::Http { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_page() {
        let body = br#"{
            "_scroll_id": "abc",
            "_shards": {"total": 5, "successful": 5, "failed": 0},
            "hits": {"total": {"value": 42, "relation": "eq"},
                     "hits": [{"_index": "logs", "_id": "1", "_source": {"a": 1}},
                              {"_index": "logs", "_id": "2", "_source": {"b": [1, 2]}}]}
        }"#;
        let resp: SearchResponse = serde_json::from_slice(body).unwrap();
        let page = resp.into_page("t");
        assert_eq!(page.cursor.as_deref(), Some("abc"));
        assert_eq!(page.total_hint, Some(42));
        assert!(!page.exhausted);
        let docs: Vec<&str> = page.documents.iter().map(|d| d.get()).collect();
        assert_eq!(docs, vec![r#"{"a": 1}"#, r#"{"b": [1, 2]}"#]);
    }

    #[test]
    fn empty_hits_exhausted() {
        let body = br#"{"_scroll_id": "abc", "hits": {"total": 0, "hits": []}}"#;
        let page = serde_json::from_slice::<SearchResponse>(body)
            .unwrap()
            .into_page("t");
        assert!(page.exhausted);
        assert_eq!(page.total_hint, Some(0));
    }

    #[test]
    fn lower_bound_total_ignored() {
        let body = br#"{"hits": {"total": {"value": 10000, "relation": "gte"}, "hits": []}}"#;
        let page = serde_json::from_slice::<SearchResponse>(body)
            .unwrap()
            .into_page("t");
        assert_eq!(page.total_hint, None);
        assert_eq!(page.cursor, None);
    }

    #[test]
    fn classify_index_not_found() {
        let body = br#"{"error": {"root_cause": [{"type": "index_not_found_exception", "reason": "no such index [logs]"}],
                        "type": "index_not_found_exception", "reason": "no such index [logs]"}, "status": 404}"#;
        let err = classify(404, body, "logs");
        assert!(matches!(err, ExportError::IndexNotFound(ref i) if i == "logs"));
    }

    #[test]
    fn classify_auth() {
        let body = br#"{"error": {"type": "security_exception", "reason": "unable to authenticate user [bob]"}, "status": 401}"#;
        match classify(401, body, "logs") {
            ExportError::Authentication(msg) => assert!(msg.contains("bob")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn classify_slice_limit() {
        let body = br#"{"error": {"root_cause": [{"type": "illegal_argument_exception",
            "reason": "The number of slices [2048] is too large. It must be less than [1024]."}],
            "type": "search_phase_execution_exception", "reason": "all shards failed"}, "status": 400}"#;
        assert!(matches!(classify(400, body, "logs"), ExportError::SliceLimit(_)));

        let body = br#"{"error": {"type": "illegal_argument_exception", "reason": "max must be greater than 1"}}"#;
        assert!(matches!(classify(400, body, "logs"), ExportError::SliceLimit(_)));
    }

    #[test]
    fn classify_other_bad_request() {
        let body = br#"{"error": {"type": "parsing_exception", "reason": "unknown query [mach_all]"}}"#;
        let err = classify(400, body, "logs");
        assert!(matches!(err, ExportError::Http { status: 400, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn classify_server_error_retryable() {
        let err = classify(503, b"upstream unavailable", "logs");
        match &err {
            ExportError::Http { status, message } => {
                assert_eq!(*status, 503);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn classify_scroll_expired_not_index_missing() {
        let body = br#"{"error": {"type": "search_context_missing_exception", "reason": "No search context found for id [7]"}}"#;
        let err = classify(404, body, "logs");
        assert!(matches!(err, ExportError::Http { status: 404, .. }));
    }

    #[test]
    fn classify_string_error() {
        let err = classify(500, br#"{"error": "boom"}"#, "logs");
        assert!(matches!(err, ExportError::Http { ref message, .. } if message == "boom"));
    }

    #[test]
    fn long_body_truncated() {
        let body = "x".repeat(1000);
        match classify(502, body.as_bytes(), "logs") {
            ExportError::Http { message, .. } => assert!(message.len() <= MAX_BODY_EXCERPT + 3),
            other => panic!("unexpected: {other}"),
        }
    }
}
