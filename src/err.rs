use axum::http::header::SET_COOKIE;
use axum::http::{StatusCode, Uri};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

pub type Payload<T> = Result<Reply<T>, Error>;

/// 200 with `value` flattened next to `success: true`.
pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Reply::new(StatusCode::OK, value))
}

/// Same as [`proceeds`] but answers 201.
pub fn creates<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Reply::new(StatusCode::CREATED, value))
}

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug)]
pub struct Reply<V> {
    status: StatusCode,
    cookies: Vec<String>,
    body: Success<V>,
}

impl<V: Serialize> Reply<V> {
    pub fn new(status: StatusCode, value: V) -> Self {
        Self {
            status,
            cookies: Vec::new(),
            body: Success::of(value),
        }
    }

    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.cookies.push(cookie);
        self
    }
}

impl<V> IntoResponse for Reply<V>
where
    V: Serialize,
{
    fn into_response(self) -> Response {
        let cookies = self.cookies.into_iter().map(|c| (SET_COOKIE, c));
        (self.status, AppendHeaders(cookies), Json(self.body)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[serde(tag = "error")]
pub enum Error {
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    Authentication { message: String },
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("{message}")]
    CsrfMismatch { message: String },
    #[error("{message}")]
    NotFoundOrForbidden { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Conflict { message: String },
    #[error("{message}")]
    Storage { message: String },
    #[error("{kind}: {message}")]
    Internal { kind: &'static str, message: String },
}

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Error {
        Error::Validation {
            message: msg.into(),
        }
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Error {
        Error::Unauthorized {
            message: msg.into(),
        }
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Error {
        Error::Conflict {
            message: msg.into(),
        }
    }

    pub fn not_found_or_forbidden<S: Into<String>>(msg: S) -> Error {
        Error::NotFoundOrForbidden {
            message: msg.into(),
        }
    }

    pub fn invalid_credentials() -> Error {
        Error::Authentication {
            message: "Invalid email or password.".to_string(),
        }
    }

    pub fn csrf_mismatch() -> Error {
        Error::CsrfMismatch {
            message: "Security token validation failed. Please try again.".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Error::Unauthorized { .. } | Error::CsrfMismatch { .. } => StatusCode::FORBIDDEN,
            Error::NotFoundOrForbidden { .. } | Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Storage { .. } | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    #[serde(flatten)]
    error: &'a Error,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Failure {
            success: false,
            error: &self,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation => Error::conflict("Resource already exists"),
            StoreError::Database(message) => {
                log::error!("Storage failure: {}", message);
                Error::Storage {
                    message: "Database error. Please try again later.".to_string(),
                }
            }
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        log::error!("Password hashing failure: {}", err);
        Self::Internal {
            kind: "PasswordHashError",
            message: "Error processing password. Please try again.".to_string(),
        }
    }
}
