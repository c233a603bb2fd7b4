//! Bearer token decoding and validity checks
//!
//! Tokens are JWT-shaped: `header.payload.signature`, each segment base64url.
//! Only the payload is inspected. Signatures are not verified here; the
//! backend is the authority on authenticity, the client only needs to know
//! whether a token is worth presenting.
//!
//! # Fail closed
//!
//! - Missing token → invalid + expired
//! - Undecodable token → invalid + expired
//! - Decodable token without a numeric `exp` claim → invalid + expired
//! - `now >= exp` → invalid + expired
//!
//! # Pure Functions
//!
//! Nothing in this module touches storage or emits events. Callers decide
//! what to do with an invalid token (see `Credentials` and the session
//! manager).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Derived view of a token at a point in time
///
/// Recomputed on every check; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Token decodable, has a numeric expiry, and is not expired
    pub is_valid: bool,

    /// `now >= exp`, or no usable expiry at all
    pub is_expired: bool,

    /// Expiry instant from the `exp` claim
    pub expires_at: Option<DateTime<Utc>>,

    /// Remaining lifetime (zero once expired)
    pub time_until_expiry: Option<Duration>,
}

impl TokenInfo {
    /// The fail-closed result
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            is_expired: true,
            expires_at: None,
            time_until_expiry: None,
        }
    }
}

/// Claims this client understands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiry, seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,

    /// Issued-at, seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<f64>,
}

/// Validate a token against the current time
///
/// # Examples
///
/// ```
/// use labtrack_common::token::validate_token;
///
/// let info = validate_token(None);
/// assert!(!info.is_valid);
/// assert!(info.is_expired);
///
/// let garbage = validate_token(Some("not-a-jwt"));
/// assert!(!garbage.is_valid);
/// ```
pub fn validate_token(token: Option<&str>) -> TokenInfo {
    validate_token_at(token, Utc::now())
}

/// Validate a token against an explicit instant
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use labtrack_common::token::{issue_unsigned_token, validate_token_at, TokenClaims};
///
/// let now = Utc::now();
/// let token = issue_unsigned_token(&TokenClaims {
///     exp: Some((now + Duration::hours(1)).timestamp() as f64),
///     ..Default::default()
/// });
///
/// let info = validate_token_at(Some(&token), now);
/// assert!(info.is_valid);
/// assert!(!info.is_expired);
/// assert!(info.time_until_expiry.unwrap() > Duration::zero());
/// ```
pub fn validate_token_at(token: Option<&str>, now: DateTime<Utc>) -> TokenInfo {
    let Some(payload) = token.and_then(decode_payload) else {
        return TokenInfo::invalid();
    };

    // Only a JSON number counts; "exp": "123" is rejected
    let Some(exp) = payload.get("exp").and_then(Value::as_f64) else {
        return TokenInfo::invalid();
    };

    let Some(expires_at) = DateTime::<Utc>::from_timestamp_millis((exp * 1000.0) as i64) else {
        return TokenInfo::invalid();
    };

    let is_expired = now >= expires_at;
    let remaining = if is_expired {
        Duration::zero()
    } else {
        expires_at - now
    };

    TokenInfo {
        is_valid: !is_expired,
        is_expired,
        expires_at: Some(expires_at),
        time_until_expiry: Some(remaining),
    }
}

/// Decode the claims this client understands
///
/// Returns `None` when the payload is not decodable JSON. Claims with an
/// unexpected type (e.g. string `exp`) decode as absent.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = decode_payload(token)?;
    Some(TokenClaims {
        sub: payload.get("sub").and_then(Value::as_str).map(str::to_string),
        email: payload.get("email").and_then(Value::as_str).map(str::to_string),
        exp: payload.get("exp").and_then(Value::as_f64),
        iat: payload.get("iat").and_then(Value::as_f64),
    })
}

/// Build an unsigned JWT-shaped token carrying `claims`
///
/// Used by the mock backend and tests. The signature segment is a fixed
/// marker, not a MAC.
pub fn issue_unsigned_token(claims: &TokenClaims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    format!("{}.{}.unsigned", header, payload)
}

fn decode_payload(token: &str) -> Option<Value> {
    let mut segments = token.trim().split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    // Some issuers keep base64 padding
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    value.is_object().then_some(value)
}
