use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};

use crate::attendance::{self, CheckIn, CourseAttendance, OpenedSession, SessionAttendance};
use crate::err::{creates, proceeds, Payload};
use crate::routes::extract::{CurrentSession, FormInput, JsonInput, QueryInput};
use crate::routes::AppState;

#[serde_as]
#[derive(Debug, Deserialize)]
pub struct SessionForm {
    course_id: i64,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    duration_minutes: Option<i32>,
    #[serde(default)]
    csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndSession {
    session_id: i64,
    #[serde(default)]
    csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckInForm {
    #[serde(default, alias = "code")]
    attendance_code: String,
    #[serde(default)]
    csrf_token: Option<String>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    course_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SessionOpened {
    message: &'static str,
    #[serde(flatten)]
    session: OpenedSession,
}

#[derive(Debug, Serialize)]
pub struct SessionEnded {
    message: &'static str,
    session_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckedIn {
    message: &'static str,
    #[serde(flatten)]
    check_in: CheckIn,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AttendanceReport {
    Detail {
        course_id: i64,
        sessions: Vec<SessionAttendance>,
    },
    Summary {
        courses: Vec<CourseAttendance>,
    },
}

pub async fn create_session(
    State(state): State<AppState>,
    current: CurrentSession,
    FormInput(form): FormInput<SessionForm>,
) -> Payload<SessionOpened> {
    let session = current.require_csrf(form.csrf_token.as_deref())?;
    let opened = attendance::create_session(
        state.store.as_ref(),
        session,
        form.course_id,
        form.duration_minutes,
    )
    .await?;
    creates(SessionOpened {
        message: "Attendance session started",
        session: opened,
    })
}

pub async fn end_session(
    State(state): State<AppState>,
    current: CurrentSession,
    JsonInput(body): JsonInput<EndSession>,
) -> Payload<SessionEnded> {
    let session = current.require_csrf(body.csrf_token.as_deref())?;
    attendance::end_session(state.store.as_ref(), session, body.session_id).await?;
    proceeds(SessionEnded {
        message: "Session ended",
        session_id: body.session_id,
    })
}

pub async fn check_in(
    State(state): State<AppState>,
    current: CurrentSession,
    FormInput(form): FormInput<CheckInForm>,
) -> Payload<CheckedIn> {
    let session = current.require_csrf(form.csrf_token.as_deref())?;
    let check_in = attendance::check_in(state.store.as_ref(), session, &form.attendance_code).await?;
    creates(CheckedIn {
        message: "Attendance recorded",
        check_in,
    })
}

/// Per-session rows for `?course_id=N`, otherwise one summary row per
/// enrolled course.
pub async fn report(
    State(state): State<AppState>,
    current: CurrentSession,
    QueryInput(query): QueryInput<ReportQuery>,
) -> Payload<AttendanceReport> {
    let store = state.store.as_ref();
    match query.course_id.filter(|id| *id > 0) {
        Some(course_id) => proceeds(AttendanceReport::Detail {
            course_id,
            sessions: attendance::detailed_report(store, &current.session, course_id).await?,
        }),
        None => proceeds(AttendanceReport::Summary {
            courses: attendance::summary_report(store, &current.session).await?,
        }),
    }
}
