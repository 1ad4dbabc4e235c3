//! Extraction d'identité depuis la requête
//!
//! L'émission et la validation des jetons sont assurées en amont (service
//! d'identité externe) ; ici on ne fait que publier l'identité présente dans
//! l'en-tête `Authorization: Bearer` ou le cookie `auth_token` sur les
//! extensions de la requête. Les routes protégées vérifient la présence.

use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

/// Nom du cookie porteur du jeton
const AUTH_COOKIE: &str = "auth_token";

/// Identité publiée sur le contexte de la requête
#[derive(Debug, Clone)]
pub struct Identity {
    /// Jeton opaque tel que présenté par le client
    pub token: String,
}

/// Middleware : publie l'identité sur les extensions quand un jeton est
/// présent. Sans jeton, la requête continue en accès public.
pub async fn identity_middleware(mut req: Request, next: Next) -> Response {
    if let Some(token) = extract_token(req.headers()) {
        req.extensions_mut().insert(Identity { token });
    }
    next.run(req).await
}

/// Cherche un jeton : cookie `auth_token` d'abord, puis en-tête Bearer.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie_header) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        for part in cookie_header.split(';') {
            if let Some((name, value)) = part.trim().split_once('=') {
                if name == AUTH_COOKIE && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("session=x; auth_token=tok-cookie"),
        );
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-header"));
        assert_eq!(extract_token(&headers), Some("tok-cookie".to_string()));
    }

    #[test]
    fn test_no_token() {
        let headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn test_empty_bearer_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers), None);
    }
}
