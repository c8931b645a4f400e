use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use url::form_urlencoded;

use crate::transport::{HttpRequest, Method};

const AUTH_URL: &str = "https://myanimelist.net/v1/oauth2/authorize";
const TOKEN_URL: &str = "https://myanimelist.net/v1/oauth2/token";

/// Length of generated PKCE verifiers (the RFC 7636 maximum).
const VERIFIER_LEN: usize = 128;

/// Token endpoint reply. Refresh tokens are not kept: an expired session
/// means logging in again.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// A PKCE challenge/verifier pair for one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub code_challenge: String,
    pub code_verifier: String,
}

impl PkcePair {
    /// Generate a pair for the `plain` method, where challenge == verifier.
    /// MAL does not support `S256`.
    pub fn plain() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(VERIFIER_LEN)
            .map(char::from)
            .collect();
        Self {
            code_challenge: verifier.clone(),
            code_verifier: verifier,
        }
    }
}

/// Build the consent page URL for an authorization-code + PKCE login.
pub fn authorize_url(client_id: &str, pkce: &PkcePair, redirect_uri: Option<&str>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("code_challenge", &pkce.code_challenge)
        .append_pair("code_challenge_method", "plain");
    if let Some(uri) = redirect_uri {
        query.append_pair("redirect_uri", uri);
    }
    format!("{AUTH_URL}?{}", query.finish())
}

/// Build the form POST that exchanges an authorization code for tokens.
pub fn token_request(
    client_id: &str,
    code: &str,
    pkce: &PkcePair,
    redirect_uri: Option<&str>,
) -> HttpRequest {
    let mut form = vec![
        ("client_id", client_id.to_string()),
        ("code", code.to_string()),
        ("code_verifier", pkce.code_verifier.clone()),
        ("grant_type", "authorization_code".to_string()),
    ];
    if let Some(uri) = redirect_uri {
        form.push(("redirect_uri", uri.to_string()));
    }
    HttpRequest::new(Method::Post, TOKEN_URL)
        .header("Accept", "application/json")
        .form(form)
}
