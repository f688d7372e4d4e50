use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::enrollment;
use crate::err::{creates, proceeds, Payload};
use crate::models::{Enrollment, PendingRequest};
use crate::routes::extract::{CurrentSession, FormInput, JsonInput};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct JoinForm {
    course_id: i64,
    #[serde(default)]
    csrf_token: Option<String>,
}

/// JSON body of approve and reject. The anti-forgery token usually travels in
/// the `X-CSRF-Token` header instead.
#[derive(Debug, Deserialize)]
pub struct RequestAction {
    request_id: i64,
    #[serde(default)]
    csrf_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinRequested {
    message: &'static str,
    request_id: i64,
}

#[derive(Debug, Serialize)]
pub struct Approved {
    message: &'static str,
    #[serde(flatten)]
    enrollment: Enrollment,
}

#[derive(Debug, Serialize)]
pub struct Rejected {
    message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PendingList {
    requests: Vec<PendingRequest>,
}

pub async fn request_join(
    State(state): State<AppState>,
    current: CurrentSession,
    FormInput(form): FormInput<JoinForm>,
) -> Payload<JoinRequested> {
    let session = current.require_csrf(form.csrf_token.as_deref())?;
    let request_id = enrollment::request_join(state.store.as_ref(), session, form.course_id).await?;
    creates(JoinRequested {
        message: "Join request sent",
        request_id,
    })
}

pub async fn approve_request(
    State(state): State<AppState>,
    current: CurrentSession,
    JsonInput(body): JsonInput<RequestAction>,
) -> Payload<Approved> {
    let session = current.require_csrf(body.csrf_token.as_deref())?;
    let enrollment =
        enrollment::approve_request(state.store.as_ref(), session, body.request_id).await?;
    proceeds(Approved {
        message: "Request approved",
        enrollment,
    })
}

pub async fn reject_request(
    State(state): State<AppState>,
    current: CurrentSession,
    JsonInput(body): JsonInput<RequestAction>,
) -> Payload<Rejected> {
    let session = current.require_csrf(body.csrf_token.as_deref())?;
    enrollment::reject_request(state.store.as_ref(), session, body.request_id).await?;
    proceeds(Rejected {
        message: "Request rejected",
    })
}

pub async fn pending_requests(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Payload<PendingList> {
    let requests = enrollment::pending_requests(state.store.as_ref(), &current.session).await?;
    proceeds(PendingList { requests })
}
