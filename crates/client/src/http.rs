//! HTTP implementation of the [`Generator`] port.
//!
//! One call = one `POST /v1/generate` with a bearer credential and a
//! hard per-call timeout. The implementation does no retrying of its
//! own; [`crate::retrying::generate_with_retry`] layers backoff on top.

use std::time::Duration;

use atelier_core::ports::{GeneratedImage, GenerationError, GenerationRequest, Generator};
use serde::Deserialize;

/// Response header carrying the cost charged for the call.
const COST_HEADER: &str = "x-generation-cost";

const DEFAULT_MIME: &str = "image/png";

/// HTTP client for one remote generative capability endpoint.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

/// Error body shape the capability returns on non-2xx responses.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpGenerator {
    /// Create a client for `endpoint` with a hard per-call `timeout`.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    // ---- private helpers ----

    fn map_transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else if e.is_connect() {
            GenerationError::Network(e.to_string())
        } else {
            GenerationError::Unknown(e.to_string())
        }
    }
}

/// Classify a non-2xx response into the typed failure taxonomy.
///
/// 401/403 and 400/422 are permanent; 429 and 5xx are transient. A
/// 400-class body whose error code names a content-policy rejection is
/// distinguished from plain malformed input so the two surface as
/// different sub-task error kinds.
pub fn classify_status(status: u16, body: &str) -> GenerationError {
    let parsed: RemoteErrorBody = serde_json::from_str(body).unwrap_or(RemoteErrorBody {
        code: String::new(),
        message: body.chars().take(256).collect(),
    });
    let message = if parsed.message.is_empty() {
        format!("HTTP {status}")
    } else {
        parsed.message
    };

    match status {
        401 | 403 => GenerationError::Auth(message),
        400 | 422 => {
            if parsed.code == "content_policy" {
                GenerationError::ContentPolicy(message)
            } else {
                GenerationError::InvalidInput(message)
            }
        }
        429 => GenerationError::RateLimited(message),
        500..=599 => GenerationError::Remote { status, message },
        _ => GenerationError::Unknown(format!("HTTP {status}: {message}")),
    }
}

#[async_trait::async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<GeneratedImage, GenerationError> {
        let response = self
            .client
            .post(format!("{}/v1/generate", self.endpoint))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_MIME)
            .to_string();
        let cost = response
            .headers()
            .get(COST_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        if bytes.is_empty() {
            return Err(GenerationError::Unknown("empty response body".to_string()));
        }

        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            mime_type,
            cost,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn auth_statuses_are_permanent() {
        assert_matches!(classify_status(401, ""), GenerationError::Auth(_));
        assert_matches!(classify_status(403, ""), GenerationError::Auth(_));
    }

    #[test]
    fn bad_request_is_invalid_input() {
        let err = classify_status(400, r#"{"code":"bad_prompt","message":"prompt too long"}"#);
        assert_matches!(err, GenerationError::InvalidInput(m) if m == "prompt too long");
    }

    #[test]
    fn content_policy_code_is_distinguished() {
        let err = classify_status(422, r#"{"code":"content_policy","message":"refused"}"#);
        assert_matches!(err, GenerationError::ContentPolicy(m) if m == "refused");
    }

    #[test]
    fn remote_rate_limit_is_transient() {
        let err = classify_status(429, "");
        assert!(err.is_transient());
        assert_matches!(err, GenerationError::RateLimited(_));
    }

    #[test]
    fn server_errors_carry_status() {
        let err = classify_status(503, r#"{"message":"warming up"}"#);
        assert_matches!(
            err,
            GenerationError::Remote { status: 503, message } if message == "warming up"
        );
    }

    #[test]
    fn non_json_body_is_preserved_in_message() {
        let err = classify_status(500, "<html>Bad Gateway</html>");
        assert_matches!(
            err,
            GenerationError::Remote { message, .. } if message.contains("Bad Gateway")
        );
    }

    #[test]
    fn unexpected_status_is_unknown() {
        assert_matches!(classify_status(302, ""), GenerationError::Unknown(_));
    }
}
