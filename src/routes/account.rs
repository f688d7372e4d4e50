use axum::extract::State;
use axum::headers::Cookie;
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::TypedHeader;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::auth::{self, SessionCheck};
use crate::err::{creates, proceeds, Error, Payload, Reply};
use crate::models::{AuthSession, Role};
use crate::routes::extract::{
    cookie_value, expired_cookie, remember_cookie, session_cookie, CurrentSession, FormInput,
    REMEMBER_COOKIE, SESSION_COOKIE,
};
use crate::routes::AppState;
use crate::validation::{LoginForm, RegistrationForm};

#[derive(Debug, Serialize)]
pub struct Registered {
    message: &'static str,
    user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct LoggedIn {
    message: &'static str,
    email: String,
    fullname: String,
    role: Role,
    dashboard: &'static str,
    csrf_token: String,
}

impl From<&AuthSession> for LoggedIn {
    fn from(session: &AuthSession) -> Self {
        Self {
            message: "Login successful",
            email: session.email.clone(),
            fullname: session.fullname.clone(),
            role: session.role,
            dashboard: session.role.dashboard(),
            csrf_token: session.csrf_token.clone(),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Default, Serialize)]
pub struct SessionStatus {
    logged_in: bool,
    email: Option<String>,
    fullname: Option<String>,
    role: Option<Role>,
    dashboard: Option<&'static str>,
    csrf_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoggedOut {
    message: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct CsrfForm {
    #[serde(default)]
    csrf_token: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    FormInput(form): FormInput<RegistrationForm>,
) -> Payload<Registered> {
    let registration = form.validate(&state.config.auth.allowed_email_domain)?;
    let user_id = auth::register_user(state.store.as_ref(), registration).await?;
    creates(Registered {
        message: "Registration successful. Please log in.",
        user_id,
    })
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    FormInput(form): FormInput<LoginForm>,
) -> Payload<LoggedIn> {
    let login = form.validate(&state.config.auth.allowed_email_domain)?;
    let previous = cookie_value(&cookies, SESSION_COOKIE);
    let session = state
        .authority
        .authenticate(
            state.store.as_ref(),
            &login.email,
            &login.password,
            previous.as_deref(),
        )
        .await?;

    let secure = state.config.auth.secure_cookies;
    let mut reply = Reply::new(StatusCode::OK, LoggedIn::from(&session))
        .with_cookie(session_cookie(&session.ssid, secure));
    if login.remember {
        let remembered = state
            .authority
            .remember_me(state.store.as_ref(), session.user_id)
            .await?;
        reply = reply.with_cookie(remember_cookie(
            &remembered.token,
            state.authority.remember_ttl().num_seconds(),
            secure,
        ));
    }
    Ok(reply)
}

pub async fn session_status(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Payload<SessionStatus> {
    let ssid = cookie_value(&cookies, SESSION_COOKIE);
    match state
        .authority
        .check_session(state.store.as_ref(), ssid.as_deref())
        .await?
    {
        SessionCheck::Active(session) => proceeds(SessionStatus {
            logged_in: true,
            email: Some(session.email),
            fullname: Some(session.fullname),
            role: Some(session.role),
            dashboard: Some(session.role.dashboard()),
            csrf_token: Some(session.csrf_token),
        }),
        SessionCheck::Inactive => proceeds(SessionStatus::default()),
    }
}

/// Trades a remember cookie for a fresh session and a rotated cookie.
pub async fn resume(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
) -> Response {
    let secure = state.config.auth.secure_cookies;
    let token = cookie_value(&cookies, REMEMBER_COOKIE).unwrap_or_default();

    match state.authority.resume(state.store.as_ref(), &token).await {
        Ok((session, renewed)) => Reply::new(StatusCode::OK, LoggedIn::from(&session))
            .with_cookie(session_cookie(&session.ssid, secure))
            .with_cookie(remember_cookie(
                &renewed.token,
                state.authority.remember_ttl().num_seconds(),
                secure,
            ))
            .into_response(),
        Err(err) => rejected_resume(err, secure),
    }
}

/// Only a token the authority refused is cleared on the client.
fn rejected_resume(err: Error, secure: bool) -> Response {
    match err {
        Error::Authentication { .. } => (
            AppendHeaders([(SET_COOKIE, expired_cookie(REMEMBER_COOKIE, secure))]),
            err,
        )
            .into_response(),
        other => other.into_response(),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    current: CurrentSession,
    form: Option<FormInput<CsrfForm>>,
) -> Payload<LoggedOut> {
    let token = form.as_ref().and_then(|FormInput(f)| f.csrf_token.as_deref());
    let session = current.require_csrf(token)?;
    state
        .authority
        .logout(state.store.as_ref(), session)
        .await?;

    let secure = state.config.auth.secure_cookies;
    Ok(Reply::new(
        StatusCode::OK,
        LoggedOut {
            message: "Logged out",
        },
    )
    .with_cookie(expired_cookie(SESSION_COOKIE, secure))
    .with_cookie(expired_cookie(REMEMBER_COOKIE, secure)))
}
