//! Upgrade-request validation.
//!
//! A client opens `ws://host:port/?token=…&sendID=…&platformID=…`. All three
//! parameters must be present and the token must verify before the transport
//! is upgraded; otherwise the HTTP request is answered with an error status
//! and no connection is created.

use crate::auth::TokenVerifier;
use msgate_core::{GateError, Platform};
use tokio_tungstenite::tungstenite::handshake::server::ErrorResponse;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing::{info, warn};

pub const PARAM_TOKEN: &str = "token";
pub const PARAM_USER_ID: &str = "sendID";
pub const PARAM_PLATFORM: &str = "platformID";

/// Identity claimed by an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    pub token: String,
    pub user_id: String,
    pub platform: Platform,
}

/// Why an upgrade request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingParams,
    UnknownPlatform(String),
    Unauthorized(String),
    Overloaded,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::MissingParams => StatusCode::UNAUTHORIZED,
            Rejection::UnknownPlatform(_) => StatusCode::BAD_REQUEST,
            Rejection::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Rejection::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn body(&self) -> String {
        match self {
            Rejection::MissingParams => format!(
                "missing one of {PARAM_TOKEN}, {PARAM_USER_ID}, {PARAM_PLATFORM}"
            ),
            Rejection::UnknownPlatform(p) => format!("unknown platform: {p}"),
            Rejection::Unauthorized(reason) => reason.clone(),
            Rejection::Overloaded => "too many connections".to_string(),
        }
    }

    /// HTTP response returned instead of the 101 upgrade.
    pub fn into_response(self) -> ErrorResponse {
        let mut resp = ErrorResponse::new(Some(self.body()));
        *resp.status_mut() = self.status();
        resp.headers_mut()
            .insert("Sec-WebSocket-Version", HeaderValue::from_static("13"));
        resp
    }
}

/// Extract the three handshake parameters from a request query string.
pub fn parse_query(query: Option<&str>) -> Result<HandshakeParams, Rejection> {
    let mut token = None;
    let mut user_id = None;
    let mut platform = None;

    for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match name.as_ref() {
            PARAM_TOKEN if token.is_none() => token = Some(value.into_owned()),
            PARAM_USER_ID if user_id.is_none() => user_id = Some(value.into_owned()),
            PARAM_PLATFORM if platform.is_none() => platform = Some(value.into_owned()),
            _ => {}
        }
    }

    let (Some(token), Some(user_id), Some(platform)) = (token, user_id, platform) else {
        return Err(Rejection::MissingParams);
    };
    let platform = Platform::parse(&platform).map_err(|_| Rejection::UnknownPlatform(platform))?;

    Ok(HandshakeParams {
        token,
        user_id,
        platform,
    })
}

/// Validate and authenticate an upgrade request's query string.
pub fn authenticate(
    query: Option<&str>,
    verifier: &TokenVerifier,
) -> Result<HandshakeParams, Rejection> {
    let params = parse_query(query).inspect_err(|r| {
        warn!(reason = %r.body(), "rejected upgrade: bad arguments");
    })?;

    match verifier.verify(&params.token, &params.user_id, params.platform) {
        Ok(()) => {
            info!(user_id = %params.user_id, platform = %params.platform, "connection authenticated");
            Ok(params)
        }
        Err(e) => {
            warn!(user_id = %params.user_id, platform = %params.platform, error = %e, "token verification failed");
            let reason = match e {
                GateError::TokenStore(_) => "token store unavailable".to_string(),
                other => other.to_string(),
            };
            Err(Rejection::Unauthorized(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, TokenStore};
    use msgate_core::{create_token, generate_secret};
    use std::sync::Arc;

    #[test]
    fn parses_all_three_params() {
        let p = parse_query(Some("token=abc&sendID=u%201&platformID=5")).unwrap();
        assert_eq!(p.token, "abc");
        assert_eq!(p.user_id, "u 1");
        assert_eq!(p.platform, Platform::Web);
    }

    #[test]
    fn platform_by_name() {
        let p = parse_query(Some("token=abc&sendID=u1&platformID=android")).unwrap();
        assert_eq!(p.platform, Platform::Android);
    }

    #[test]
    fn missing_or_empty_params_are_rejected() {
        assert_eq!(parse_query(None), Err(Rejection::MissingParams));
        assert_eq!(parse_query(Some("token=abc&sendID=u1")), Err(Rejection::MissingParams));
        assert_eq!(
            parse_query(Some("token=&sendID=u1&platformID=5")),
            Err(Rejection::MissingParams)
        );
    }

    #[test]
    fn unknown_platform_is_bad_request() {
        let r = parse_query(Some("token=abc&sendID=u1&platformID=42")).unwrap_err();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bad_token_is_unauthorized_with_body() {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let verifier = TokenVerifier::new(generate_secret(), store);
        let r = authenticate(Some("token=00&sendID=u1&platformID=5"), &verifier).unwrap_err();
        let resp = r.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.body().as_deref().is_some_and(|b| !b.is_empty()));
    }

    #[test]
    fn good_token_authenticates() {
        let secret = generate_secret();
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let verifier = TokenVerifier::new(secret.clone(), store);
        let token = create_token(&secret, "u1", Platform::Web, 60);
        let q = format!("token={token}&sendID=u1&platformID=5");
        assert_eq!(authenticate(Some(&q), &verifier).unwrap().user_id, "u1");
    }
}
