use async_trait::async_trait;
use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query};
use axum::headers::Cookie;
use axum::http::request::Parts;
use axum::http::Request;
use axum::{Form, Json, TypedHeader};

use crate::auth::{SessionAuthority, SessionCheck};
use crate::err::Error;
use crate::models::AuthSession;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "sid";
pub const REMEMBER_COOKIE: &str = "remember_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

pub fn cookie_value(cookies: &Option<TypedHeader<Cookie>>, name: &str) -> Option<String> {
    cookies
        .as_ref()
        .and_then(|TypedHeader(jar)| jar.get(name))
        .map(str::to_string)
}

fn with_flags(cookie: String, secure: bool) -> String {
    if secure {
        format!("{}; HttpOnly; SameSite=Lax; Secure", cookie)
    } else {
        format!("{}; HttpOnly; SameSite=Lax", cookie)
    }
}

pub fn session_cookie(ssid: &str, secure: bool) -> String {
    with_flags(format!("{}={}; Path=/", SESSION_COOKIE, ssid), secure)
}

pub fn remember_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    with_flags(
        format!("{}={}; Path=/; Max-Age={}", REMEMBER_COOKIE, token, max_age_secs),
        secure,
    )
}

pub fn expired_cookie(name: &str, secure: bool) -> String {
    with_flags(format!("{}=; Path=/; Max-Age=0", name), secure)
}

/// The caller's live login session, resolved from the `sid` cookie. Requests
/// without one are refused before the handler runs.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: AuthSession,
    header_token: Option<String>,
}

impl CurrentSession {
    /// Anti-forgery check for mutations. A token in the body wins over the
    /// `X-CSRF-Token` header.
    pub fn require_csrf(&self, body_token: Option<&str>) -> Result<&AuthSession, Error> {
        let candidate = body_token
            .filter(|t| !t.is_empty())
            .or(self.header_token.as_deref());
        SessionAuthority::verify_csrf(&self.session, candidate)?;
        Ok(&self.session)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Error> {
        let cookies = TypedHeader::<Cookie>::from_request_parts(parts, state).await.ok();
        let ssid = cookie_value(&cookies, SESSION_COOKIE);

        match state
            .authority
            .check_session(state.store.as_ref(), ssid.as_deref())
            .await?
        {
            SessionCheck::Active(session) => Ok(Self {
                session,
                header_token: parts
                    .headers
                    .get(CSRF_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            }),
            SessionCheck::Inactive => Err(Error::unauthorized(
                "Unauthorized: please log in to continue",
            )),
        }
    }
}

// Body extractors whose rejections come back as our JSON validation error
// instead of axum's plain-text responses.
macro_rules! validated_body {
    ($name:ident, $inner:ident, $rejection:ty) => {
        #[derive(Debug, Clone)]
        pub struct $name<T>(pub T);

        #[async_trait]
        impl<T, S, B> FromRequest<S, B> for $name<T>
        where
            $inner<T>: FromRequest<S, B, Rejection = $rejection>,
            S: Send + Sync,
            B: Send + 'static,
        {
            type Rejection = Error;

            async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
                match $inner::<T>::from_request(req, state).await {
                    Ok(value) => Ok(Self(value.0)),
                    Err(rejection) => Err(Error::validation(rejection.body_text())),
                }
            }
        }
    };
}

validated_body!(FormInput, Form, FormRejection);
validated_body!(JsonInput, Json, JsonRejection);

#[derive(Debug, Clone)]
pub struct QueryInput<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryInput<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(Error::validation(rejection.body_text())),
        }
    }
}
