//! GitHub OAuth constants
//!
//! Endpoint URLs and flow defaults. The client id and redirect URI are
//! deployment-specific and live in configuration; everything GitHub-side
//! is fixed here. None of these values are secrets.

/// Authorization endpoint the browser is redirected to
pub const AUTHORIZE_ENDPOINT: &str = "https://github.com/login/oauth/authorize";

/// Authenticated user-info endpoint
pub const USER_ENDPOINT: &str = "https://api.github.com/user";

/// Default OAuth scopes. `read:user` is enough to display the visitor's
/// avatar; anything broader is deliberately not requested.
pub const DEFAULT_SCOPES: &str = "read:user";

/// Random bytes in a fresh code verifier (64 bytes → 86 base64url chars,
/// inside the 43-128 char range RFC 7636 requires)
pub const DEFAULT_VERIFIER_BYTES: usize = 64;

/// Random bytes in the anti-CSRF state token
pub const STATE_BYTES: usize = 16;

/// Fallback token lifetime when the token proxy omits `expires_in`:
/// 30 days, in seconds. Deployments can override this in config.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// User-Agent for GitHub API calls. GitHub rejects requests without one.
pub const USER_AGENT: &str = "github-login-gateway";
