//! Typed client for the Payments service.
//!
//! [`PaymentsApi`] is the seam the edge API (authorize) and the orchestrator
//! (capture/void) program against; [`HttpPaymentsClient`] is the production
//! implementation. Every mutation carries an idempotency key so retries
//! collapse at the gateway.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Request body for `POST /payments/authorize`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub token: String,
    pub idempotency_key: String,
}

/// An authorization as reported by the Payments service.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationResponse {
    pub authorization_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
struct MutationRequest<'a> {
    idempotency_key: &'a str,
}

/// Typed failure modes of the Payments service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentsError {
    #[error("payment declined ({decline_code}): {message}")]
    Declined { decline_code: String, message: String },

    #[error("authorization already captured")]
    AlreadyCaptured,

    #[error("authorization already voided")]
    AlreadyVoided,

    #[error("authorization not found")]
    AuthorizationNotFound,

    #[error("payment gateway error: {message}")]
    Gateway { message: String },

    #[error("payments service connection error: {message}")]
    Connection { message: String },

    #[error("unexpected payments response ({status}): {message}")]
    Unexpected { status: u16, message: String },
}

impl PaymentsError {
    /// Gateway trouble and connection loss are worth retrying; business
    /// outcomes (declines, state conflicts) are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway { .. } | Self::Connection { .. } => true,
            Self::Unexpected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
}

/// Map a non-success payments response onto the error taxonomy.
fn classify_error(status: StatusCode, body: &str) -> PaymentsError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or(ErrorBody {
        error: None,
        message: None,
        decline_code: None,
    });
    let message = parsed.message.unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::PAYMENT_REQUIRED => PaymentsError::Declined {
            decline_code: parsed
                .decline_code
                .unwrap_or_else(|| "card_declined".to_string()),
            message,
        },
        StatusCode::NOT_FOUND => PaymentsError::AuthorizationNotFound,
        StatusCode::CONFLICT => match parsed.error.as_deref() {
            Some("already_captured") => PaymentsError::AlreadyCaptured,
            Some("already_voided") => PaymentsError::AlreadyVoided,
            _ => PaymentsError::Unexpected {
                status: status.as_u16(),
                message,
            },
        },
        StatusCode::SERVICE_UNAVAILABLE => PaymentsError::Gateway { message },
        other => PaymentsError::Unexpected {
            status: other.as_u16(),
            message,
        },
    }
}

/// Seam for payment gateway operations.
#[async_trait]
pub trait PaymentsApi: Send + Sync {
    async fn authorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizationResponse, PaymentsError>;

    async fn capture(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<AuthorizationResponse, PaymentsError>;

    async fn void(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<AuthorizationResponse, PaymentsError>;
}

/// HTTP implementation of [`PaymentsApi`].
#[derive(Debug, Clone)]
pub struct HttpPaymentsClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPaymentsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthorizationResponse, PaymentsError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentsError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<AuthorizationResponse>()
                .await
                .map_err(|e| PaymentsError::Unexpected {
                    status: status.as_u16(),
                    message: format!("malformed response body: {e}"),
                })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_error(status, &body))
        }
    }
}

#[async_trait]
impl PaymentsApi for HttpPaymentsClient {
    async fn authorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizationResponse, PaymentsError> {
        self.post_json("/payments/authorize", request).await
    }

    async fn capture(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<AuthorizationResponse, PaymentsError> {
        self.post_json(
            &format!("/payments/capture/{authorization_id}"),
            &MutationRequest { idempotency_key },
        )
        .await
    }

    async fn void(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<AuthorizationResponse, PaymentsError> {
        self.post_json(
            &format!("/payments/void/{authorization_id}"),
            &MutationRequest { idempotency_key },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_classification() {
        let body = r#"{"error":"payment_declined","decline_code":"insufficient_funds","message":"Card has insufficient funds","is_retryable":false}"#;
        let err = classify_error(StatusCode::PAYMENT_REQUIRED, body);

        match err {
            PaymentsError::Declined {
                decline_code,
                message,
            } => {
                assert_eq!(decline_code, "insufficient_funds");
                assert_eq!(message, "Card has insufficient funds");
            }
            other => panic!("expected Declined, got {other:?}"),
        }
    }

    #[test]
    fn test_conflict_classification() {
        let captured =
            classify_error(StatusCode::CONFLICT, r#"{"error":"already_captured"}"#);
        assert!(matches!(captured, PaymentsError::AlreadyCaptured));

        let voided = classify_error(StatusCode::CONFLICT, r#"{"error":"already_voided"}"#);
        assert!(matches!(voided, PaymentsError::AlreadyVoided));
    }

    #[test]
    fn test_gateway_classification() {
        let err = classify_error(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error":"gateway_error","message":"upstream timeout","is_retryable":true}"#,
        );
        assert!(matches!(err, PaymentsError::Gateway { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryability() {
        assert!(!PaymentsError::Declined {
            decline_code: "card_declined".into(),
            message: String::new(),
        }
        .is_retryable());
        assert!(!PaymentsError::AlreadyCaptured.is_retryable());
        assert!(!PaymentsError::AuthorizationNotFound.is_retryable());
        assert!(PaymentsError::Connection {
            message: "timeout".into(),
        }
        .is_retryable());
        assert!(PaymentsError::Unexpected {
            status: 502,
            message: String::new(),
        }
        .is_retryable());
        assert!(!PaymentsError::Unexpected {
            status: 422,
            message: String::new(),
        }
        .is_retryable());
    }

    #[test]
    fn test_unparseable_body_falls_back_to_raw_text() {
        let err = classify_error(StatusCode::SERVICE_UNAVAILABLE, "bad gateway");
        match err {
            PaymentsError::Gateway { message } => assert_eq!(message, "bad gateway"),
            other => panic!("expected Gateway, got {other:?}"),
        }
    }
}
