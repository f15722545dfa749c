use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authorization state machine: AUTHORIZED -> CAPTURED or AUTHORIZED ->
/// VOIDED. The two terminal states never convert into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Captured,
    Voided,
}

impl AuthorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "AUTHORIZED",
            Self::Captured => "CAPTURED",
            Self::Voided => "VOIDED",
        }
    }
}

impl std::str::FromStr for AuthorizationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTHORIZED" => Ok(Self::Authorized),
            "CAPTURED" => Ok(Self::Captured),
            "VOIDED" => Ok(Self::Voided),
            other => Err(format!("unknown authorization status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Authorization {
    pub authorization_id: String,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: AuthorizationStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub token: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationRequest {
    pub idempotency_key: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizationResponse {
    pub authorization_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
}

impl From<&Authorization> for AuthorizationResponse {
    fn from(authorization: &Authorization) -> Self {
        Self {
            authorization_id: authorization.authorization_id.clone(),
            status: authorization.status.as_str().to_string(),
            amount_cents: authorization.amount_cents,
            currency: authorization.currency.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
