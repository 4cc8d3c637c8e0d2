//! Callback parameter validation and duplicate-delivery guard
//!
//! Browsers and load balancers can deliver the OAuth callback more than
//! once (prefetch, refresh, double navigation). The authorization code is
//! single-use, so only the first delivery of a given `code`/`state` pair
//! may reach the token exchange; later deliveries of the same pair are
//! dropped, and a *different* pair supersedes the one in flight.

use std::sync::Mutex;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Query parameters GitHub appends to the redirect URI.
///
/// On success GitHub sends `code` and `state`; on refusal it sends
/// `error` and optionally `error_description` instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Message that blocks the exchange before it starts, if any.
    ///
    /// A provider-reported error wins over missing parameters; its code
    /// and description are surfaced verbatim. Absent or empty
    /// `code`/`state` means the URL is not a usable callback at all.
    pub fn blocking_error(&self) -> Option<String> {
        if let Some(error) = self.error.as_deref()
            && !error.is_empty()
        {
            return Some(match self.error_description.as_deref() {
                Some(desc) if !desc.is_empty() => format!("{error}: {desc}"),
                _ => error.to_string(),
            });
        }
        let code_ok = self.code.as_deref().is_some_and(|c| !c.is_empty());
        let state_ok = self.state.as_deref().is_some_and(|s| !s.is_empty());
        if !code_ok || !state_ok {
            return Some("Invalid GitHub callback URL (missing code/state)".to_string());
        }
        None
    }

    /// Identity of this delivery for duplicate detection.
    pub fn attempt_key(&self) -> String {
        format!(
            "{}:{}",
            self.code.as_deref().unwrap_or_default(),
            self.state.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, PartialEq)]
enum GuardStatus {
    Idle,
    Inflight,
    Done,
}

struct GuardInner {
    key: String,
    status: GuardStatus,
    cancel: Option<CancellationToken>,
}

/// Single-flight guard over callback deliveries.
///
/// `begin` admits a key at most once while it is in flight or after it
/// completed; a new key cancels and replaces the previous attempt.
pub struct CallbackGuard {
    inner: Mutex<GuardInner>,
}

impl Default for CallbackGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackGuard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GuardInner {
                key: String::new(),
                status: GuardStatus::Idle,
                cancel: None,
            }),
        }
    }

    /// Try to admit a delivery. Returns a cancellation token scoped to
    /// this attempt, or `None` if the same key is already in flight or
    /// already completed.
    ///
    /// A different key supersedes: the previous attempt's token is
    /// cancelled so its network calls unwind instead of racing the new
    /// one for the session state.
    pub fn begin(&self, key: &str) -> Option<CancellationToken> {
        let mut inner = self.inner.lock().expect("callback guard poisoned");
        if inner.key == key && inner.status != GuardStatus::Idle {
            debug!(%key, "duplicate callback delivery dropped");
            return None;
        }
        if let Some(previous) = inner.cancel.take() {
            debug!("superseding in-flight callback attempt");
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        inner.key = key.to_string();
        inner.status = GuardStatus::Inflight;
        inner.cancel = Some(cancel.clone());
        Some(cancel)
    }

    /// Record the outcome of an admitted attempt.
    ///
    /// Success pins the key as `Done` so replays keep being dropped; a
    /// failure releases it so the user can retry the flow. Ignored if the
    /// attempt was superseded in the meantime.
    pub fn finish(&self, key: &str, success: bool) {
        let mut inner = self.inner.lock().expect("callback guard poisoned");
        if inner.key != key || inner.status != GuardStatus::Inflight {
            return;
        }
        inner.status = if success {
            GuardStatus::Done
        } else {
            GuardStatus::Idle
        };
        inner.cancel = None;
    }
}
