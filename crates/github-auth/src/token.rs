//! Token exchange and user fetch
//!
//! The two network interactions of the login flow:
//! 1. Authorization-code exchange, POSTed to the token-exchange proxy (a
//!    server-side intermediary holding the OAuth client secret so it never
//!    reaches this process or the browser).
//! 2. User-info fetch against the GitHub API with the fresh access token.
//!
//! Both accept a cancellation token. A cancelled operation aborts the
//! request and reports [`Error::Cancelled`], which callers drop silently
//! instead of surfacing as a failure.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::constants::USER_AGENT;
use crate::error::{Error, Result};
use crate::storage::GitHubUser;

/// JSON body sent to the token-exchange proxy.
#[derive(Debug, Serialize)]
pub struct ExchangeRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code: &'a str,
    pub code_verifier: &'a str,
}

/// Envelope the token proxy wraps GitHub's token response in.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenEnvelope {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: TokenData,
}

/// Token fields relayed from GitHub.
///
/// `expires_in` is a delta in seconds from the response time; the session
/// converts it to an absolute unix millisecond timestamp when storing the
/// token. GitHub omits it for classic OAuth apps, in which case the
/// configured fallback TTL applies.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TokenData {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_token_expires_in: Option<u64>,
}

/// Exchange an authorization code for a token via the proxy.
///
/// Any network failure, non-2xx status or a response without a usable
/// `access_token` is a hard failure; there is no retry, because the
/// authorization code is single-use and a replay would fail anyway.
pub async fn exchange_code(
    client: &reqwest::Client,
    proxy_url: &str,
    request: &ExchangeRequest<'_>,
    cancel: &CancellationToken,
) -> Result<TokenData> {
    let send = async {
        let response = client
            .post(proxy_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::TokenExchange(format!(
                "token proxy returned {status}: {body}"
            )));
        }

        let envelope = response
            .json::<TokenEnvelope>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

        if envelope.data.access_token.is_empty() {
            return Err(Error::TokenExchange("response missing access_token".into()));
        }
        Ok(envelope.data)
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = send => result,
    }
}

/// Fetch the authenticated user's identity from the GitHub API.
///
/// `endpoint` is configurable for tests; production uses
/// [`crate::constants::USER_ENDPOINT`]. Any non-2xx response or a body
/// without `login`/`avatar_url` is a failure.
pub async fn fetch_user(
    client: &reqwest::Client,
    endpoint: &str,
    access_token: &str,
    cancel: &CancellationToken,
) -> Result<GitHubUser> {
    let send = async {
        let response = client
            .get(endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {access_token}"))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::Http(format!("user fetch request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::UserFetch(format!(
                "user endpoint returned {status}: {body}"
            )));
        }

        let user = response
            .json::<GitHubUser>()
            .await
            .map_err(|e| Error::UserFetch(format!("invalid user response: {e}")))?;

        if user.login.is_empty() || user.avatar_url.is_empty() {
            return Err(Error::UserFetch("response missing login/avatar_url".into()));
        }
        Ok(user)
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = send => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn exchange_request<'a>() -> ExchangeRequest<'a> {
        ExchangeRequest {
            client_id: "Iv1.abc123",
            redirect_uri: "http://localhost:8080/auth/github/callback",
            code: "authcode",
            code_verifier: "verifier-value",
        }
    }

    #[test]
    fn envelope_deserializes() {
        let json = r#"{"code":0,"message":"ok","data":{"access_token":"gho_abc","token_type":"bearer","scope":"read:user","expires_in":28800}}"#;
        let envelope: TokenEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.access_token, "gho_abc");
        assert_eq!(envelope.data.token_type.as_deref(), Some("bearer"));
        assert_eq!(envelope.data.expires_in, Some(28800));
    }

    #[test]
    fn envelope_tolerates_missing_optional_fields() {
        let json = r#"{"data":{"access_token":"gho_abc"}}"#;
        let envelope: TokenEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.access_token, "gho_abc");
        assert!(envelope.data.expires_in.is_none());
        assert!(envelope.data.refresh_token.is_none());
    }

    #[tokio::test]
    async fn exchange_sends_expected_body_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_json_string(
                r#"{"client_id":"Iv1.abc123","redirect_uri":"http://localhost:8080/auth/github/callback","code":"authcode","code_verifier":"verifier-value"}"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"code":0,"message":"ok","data":{"access_token":"tok123","expires_in":3600}}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let data = exchange_code(&client, &server.uri(), &exchange_request(), &cancel)
            .await
            .unwrap();

        assert_eq!(data.access_token, "tok123");
        assert_eq!(data.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn exchange_missing_access_token_is_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"code":1,"message":"denied","data":{}}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let err = exchange_code(&client, &server.uri(), &exchange_request(), &cancel)
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::TokenExchange(_)),
            "expected TokenExchange, got {err:?}"
        );
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn exchange_non_2xx_includes_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("proxy upstream down"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let err = exchange_code(&client, &server.uri(), &exchange_request(), &cancel)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("502"), "got: {msg}");
        assert!(msg.contains("proxy upstream down"), "got: {msg}");
    }

    #[tokio::test]
    async fn exchange_cancellation_is_not_a_failure_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(10))
                    .set_body_raw(
                        r#"{"data":{"access_token":"tok"}}"#,
                        "application/json",
                    ),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let err = exchange_code(&client, &server.uri(), &exchange_request(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled(), "expected Cancelled, got {err:?}");
    }

    #[tokio::test]
    async fn fetch_user_sends_bearer_and_parses_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer tok123"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"id":42,"login":"octocat","avatar_url":"https://avatars.githubusercontent.com/u/42","html_url":"https://github.com/octocat"}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let user = fetch_user(&client, &format!("{}/user", server.uri()), "tok123", &cancel)
            .await
            .unwrap();

        assert_eq!(user.login, "octocat");
        assert_eq!(user.id, 42);
    }

    #[tokio::test]
    async fn fetch_user_non_2xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let err = fetch_user(&client, &server.uri(), "tok-expired", &cancel)
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::UserFetch(_)),
            "expected UserFetch, got {err:?}"
        );
        assert!(err.to_string().contains("401"));
    }
}
