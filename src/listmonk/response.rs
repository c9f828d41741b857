//! Import endpoint answers, parsed once into a structured result

use serde_json::Value;

/// Outcome of an import call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Success,
    /// The target accepted only part of the batch
    Partial,
    Failure,
}

/// What the loader hands back to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub status: ImportStatus,
    pub imported_count: usize,
    pub raw_response: String,
    /// Error text reported by the target, if any
    pub error: Option<String>,
}

impl ImportResult {
    pub fn is_success(&self) -> bool {
        self.status == ImportStatus::Success
    }

    fn failure(raw: &str, error: impl Into<String>) -> Self {
        Self {
            status: ImportStatus::Failure,
            imported_count: 0,
            raw_response: raw.to_string(),
            error: Some(error.into()),
        }
    }

    /// Human-readable reason for a non-success result
    pub fn describe(&self) -> String {
        match (&self.status, &self.error) {
            (_, Some(error)) => error.clone(),
            (ImportStatus::Partial, None) => {
                format!("only {} subscribers were imported", self.imported_count)
            }
            (status, None) => format!("{:?}", status),
        }
    }
}

/// Parse an import response.
///
/// A response counts as success only when the transport succeeded and the
/// payload carries a `data` object with no error indicator. An `error` or a
/// bare `message` in the payload is a failure even with HTTP 200.
pub fn parse_import_response(http_status: u16, body: &str, submitted: usize) -> ImportResult {
    let payload: Option<Value> = serde_json::from_str(body).ok();

    let reported_error = payload.as_ref().and_then(|v| {
        v.get("error")
            .filter(|e| !e.is_null())
            .or_else(|| v.get("message").filter(|_| v.get("data").is_none()))
            .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
    });

    if !(200..300).contains(&http_status) {
        let error = reported_error.unwrap_or_else(|| format!("HTTP status {}", http_status));
        return ImportResult::failure(body, format!("import rejected: {}", error));
    }

    if let Some(error) = reported_error {
        return ImportResult::failure(body, format!("import reported an error: {}", error));
    }

    let data = match payload.as_ref().and_then(|v| v.get("data")) {
        Some(Value::Object(data)) => data,
        _ => return ImportResult::failure(body, "unrecognized import response"),
    };

    let state = data.get("status").and_then(Value::as_str).unwrap_or_default();
    if matches!(state, "failed" | "stopped") {
        return ImportResult::failure(body, format!("import {}", state));
    }

    let count = |key: &str| data.get(key).and_then(Value::as_u64).map(|n| n as usize);
    let (status, imported_count) = match (state, count("imported"), count("total")) {
        ("finished", Some(imported), Some(total)) if imported < total => {
            (ImportStatus::Partial, imported)
        }
        ("finished", Some(imported), _) => (ImportStatus::Success, imported),
        _ => (ImportStatus::Success, submitted),
    };

    ImportResult {
        status,
        imported_count,
        raw_response: body.to_string(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_import_counts_submitted_rows() {
        let body = r#"{"data":{"name":"subscribers.csv","total":0,"imported":0,"status":"importing"}}"#;
        let result = parse_import_response(200, body, 5);
        assert_eq!(result.status, ImportStatus::Success);
        assert_eq!(result.imported_count, 5);
        assert_eq!(result.raw_response, body);
    }

    #[test]
    fn test_error_body_with_ok_status_is_failure() {
        let result = parse_import_response(200, r#"{"error":"invalid list"}"#, 5);
        assert_eq!(result.status, ImportStatus::Failure);
        assert_eq!(result.describe(), "import reported an error: invalid list");

        let result = parse_import_response(200, r#"{"message":"An import is already running."}"#, 5);
        assert_eq!(result.status, ImportStatus::Failure);
    }

    #[test]
    fn test_http_error_status_is_failure() {
        let result = parse_import_response(400, r#"{"message":"Invalid file"}"#, 5);
        assert_eq!(result.status, ImportStatus::Failure);
        assert_eq!(result.describe(), "import rejected: Invalid file");

        let result = parse_import_response(502, "Bad Gateway", 5);
        assert_eq!(result.describe(), "import rejected: HTTP status 502");
    }

    #[test]
    fn test_finished_import_counts() {
        let full = r#"{"data":{"total":3,"imported":3,"status":"finished"}}"#;
        assert_eq!(parse_import_response(200, full, 3).status, ImportStatus::Success);

        let partial = r#"{"data":{"total":3,"imported":2,"status":"finished"}}"#;
        let result = parse_import_response(200, partial, 3);
        assert_eq!(result.status, ImportStatus::Partial);
        assert_eq!(result.imported_count, 2);

        let failed = r#"{"data":{"total":3,"imported":0,"status":"failed"}}"#;
        assert_eq!(parse_import_response(200, failed, 3).status, ImportStatus::Failure);
    }

    #[test]
    fn test_non_json_body_is_failure() {
        let result = parse_import_response(200, "<html>login</html>", 3);
        assert_eq!(result.status, ImportStatus::Failure);
        assert_eq!(result.describe(), "unrecognized import response");
    }
}
