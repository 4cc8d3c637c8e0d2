//! PKCE (Proof Key for Code Exchange) primitives per RFC 7636
//!
//! Generates the code verifier, the S256 challenge and the anti-CSRF
//! `state` token used during the authorization flow. The verifier and
//! state are held by the pending login until the callback arrives; the
//! challenge is included in the authorization URL so GitHub can verify
//! the token exchange came from the party that initiated the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::constants::{AUTHORIZE_ENDPOINT, STATE_BYTES};

/// Generate a cryptographically random PKCE code verifier.
///
/// Fills `bytes` random bytes and encodes them as URL-safe base64 without
/// padding, so the output alphabet is exactly `[A-Za-z0-9_-]`. RFC 7636
/// requires 43-128 characters, which holds for byte counts 32-96; the
/// default is [`crate::constants::DEFAULT_VERIFIER_BYTES`].
pub fn generate_verifier(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill(buf.as_mut_slice());
    URL_SAFE_NO_PAD.encode(buf)
}

/// Generate the anti-CSRF `state` token: 16 random bytes, base64url.
///
/// Cryptographically unrelated to the verifier. GitHub returns it
/// unchanged in the callback so the pending login can be correlated.
pub fn generate_state() -> String {
    let mut buf = [0u8; STATE_BYTES];
    rand::rng().fill(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the full GitHub authorization URL.
///
/// The caller redirects the browser here; the flow continues at the
/// redirect URI when GitHub calls back with `code` and `state`.
pub fn build_authorization_url(
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
    challenge: &str,
) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
        AUTHORIZE_ENDPOINT,
        urlencoded(client_id),
        urlencoded(redirect_uri),
        urlencoded(scope),
        state,
        challenge,
    )
}

/// Minimal URL encoding for parameter values.
/// Only encodes characters that would break URL parameter parsing.
fn urlencoded(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace(':', "%3A")
        .replace('/', "%2F")
        .replace('?', "%3F")
        .replace('&', "%26")
        .replace('=', "%3D")
}
