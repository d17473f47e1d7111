use crate::services::chat::ChatOwner;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use uuid::Uuid;

/// Header carrying the anonymous chat session key
pub const SESSION_HEADER: &str = "x-session-key";
/// Cookie carrying the anonymous chat session key
pub const SESSION_COOKIE: &str = "chat_session";
/// Header set by an authenticating proxy in front of the service
pub const FORWARDED_USER_HEADER: &str = "x-user-id";

/// Identity of a caller that was authenticated upstream.
///
/// Inserted into request extensions by the authentication layer; the chat
/// endpoints treat its presence as "logged in".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
}

/// Who is talking to the assistant, resolved once per request.
#[derive(Clone, Debug)]
pub struct ChatIdentity {
    pub owner: ChatOwner,
    /// True when the session key was minted for this request and must be
    /// handed back to the client.
    pub issued_session: bool,
}

impl ChatIdentity {
    /// `Set-Cookie` value for a freshly issued anonymous session.
    pub fn session_cookie(&self) -> Option<HeaderValue> {
        match (&self.owner, self.issued_session) {
            (ChatOwner::Session(key), true) => HeaderValue::from_str(&format!(
                "{SESSION_COOKIE}={key}; Path=/; HttpOnly; SameSite=Lax"
            ))
            .ok(),
            _ => None,
        }
    }

    pub fn session_key(&self) -> Option<&str> {
        match &self.owner {
            ChatOwner::Session(key) => Some(key),
            ChatOwner::User(_) => None,
        }
    }
}

fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for ChatIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(ChatIdentity {
                owner: ChatOwner::User(user.id),
                issued_session: false,
            });
        }

        Ok(match session_from_headers(&parts.headers) {
            Some(key) => ChatIdentity {
                owner: ChatOwner::Session(key),
                issued_session: false,
            },
            None => ChatIdentity {
                owner: ChatOwner::Session(Uuid::new_v4().simple().to_string()),
                issued_session: true,
            },
        })
    }
}

/// Trust `x-user-id` from an authenticating reverse proxy.
///
/// Only installed when `trust_forwarded_user` is enabled in configuration.
pub async fn forwarded_user_middleware(mut request: Request, next: Next) -> Response {
    let forwarded = request
        .headers()
        .get(FORWARDED_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok());

    if let Some(id) = forwarded {
        request.extensions_mut().insert(AuthenticatedUser { id });
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    async fn identity_for(request: HttpRequest<()>) -> ChatIdentity {
        let (mut parts, _) = request.into_parts();
        ChatIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn authenticated_user_wins_over_session() {
        let user_id = Uuid::new_v4();
        let mut request = HttpRequest::builder()
            .header(SESSION_HEADER, "abc")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(AuthenticatedUser { id: user_id });

        let identity = identity_for(request).await;
        assert!(matches!(identity.owner, ChatOwner::User(id) if id == user_id));
        assert!(identity.session_cookie().is_none());
    }

    #[tokio::test]
    async fn session_is_read_from_cookie() {
        let request = HttpRequest::builder()
            .header(header::COOKIE, "theme=dark; chat_session=sess-77")
            .body(())
            .unwrap();

        let identity = identity_for(request).await;
        assert_eq!(identity.session_key(), Some("sess-77"));
        assert!(!identity.issued_session);
    }

    #[tokio::test]
    async fn missing_session_is_issued_with_cookie() {
        let identity = identity_for(HttpRequest::builder().body(()).unwrap()).await;

        assert!(identity.issued_session);
        let cookie = identity.session_cookie().expect("cookie issued");
        let key = identity.session_key().unwrap();
        assert!(cookie.to_str().unwrap().starts_with(&format!("chat_session={key}")));
    }
}
