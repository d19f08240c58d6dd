//! Request authentication.
//!
//! `AuthResolver` decouples "how do we know who's calling" from the route
//! handlers: it turns a bearer token into a `user_id`. The only
//! implementation today, `IdentityAuthResolver`, trusts the token verbatim,
//! which is enough for a single-tenant deployment behind a trusted proxy —
//! real JWT/session validation is an external collaborator's job and would
//! swap in a different resolver without touching any handler.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

/// Resolves a bearer token into the `user_id` it authenticates as.
pub trait AuthResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<String>;
}

/// Treats the bearer token as the user id directly.
pub struct IdentityAuthResolver;

impl AuthResolver for IdentityAuthResolver {
    fn resolve(&self, token: &str) -> Option<String> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// The authenticated caller for a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or((StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        let user_id = IdentityAuthResolver
            .resolve(token)
            .ok_or((StatusCode::UNAUTHORIZED, "empty bearer token"))?;

        Ok(AuthenticatedUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_resolver_rejects_blank_tokens() {
        assert!(IdentityAuthResolver.resolve("   ").is_none());
    }

    #[test]
    fn identity_resolver_passes_through_nonblank_tokens() {
        assert_eq!(IdentityAuthResolver.resolve("user-42").as_deref(), Some("user-42"));
    }
}
