//! Attendance sessions and check-ins.
//!
//! A session is opened with a short code that students submit to check in.
//! It accepts check-ins while it is active and its `duration_minutes` window
//! has not elapsed; `end_session` is the only way to deactivate it.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::Serialize;

use crate::err::Error;
use crate::gate::{authorize, STAFF, STUDENTS};
use crate::models::{AuthSession, NewAttendanceSession, Role};
use crate::store::{Store, StoreError};

pub const DEFAULT_DURATION_MINUTES: i32 = 10;
pub const MAX_DURATION_MINUTES: i32 = 24 * 60;

/// Six upper-case hex characters drawn from 3 bytes of OS randomness.
/// Uniqueness across live sessions is not enforced.
pub fn generate_code() -> String {
    let mut bytes = [0u8; 3];
    OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedSession {
    pub session_id: i64,
    pub course_id: i64,
    pub code: String,
    pub duration_minutes: i32,
    pub started_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckIn {
    pub session_id: i64,
    pub course_id: i64,
    pub check_in_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionAttendance {
    pub session_id: i64,
    pub session_datetime: DateTime<Utc>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseAttendance {
    pub course_id: i64,
    pub course_code: String,
    pub title: String,
    pub total_sessions: i64,
    pub sessions_attended: i64,
    pub attendance_percent: f64,
}

/// `attended / total` as a percentage with one decimal, `0.0` for a course
/// without sessions.
pub fn attendance_percent(attended: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let percent = attended as f64 * 100.0 / total as f64;
    ((percent * 10.0).round() / 10.0).clamp(0.0, 100.0)
}

pub async fn create_session(
    store: &dyn Store,
    session: &AuthSession,
    course_id: i64,
    duration_minutes: Option<i32>,
) -> Result<OpenedSession, Error> {
    authorize(session, STAFF, None)?;

    let duration_minutes = duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    let mut errors = Vec::new();
    if course_id <= 0 {
        errors.push("Invalid course id.");
    }
    if duration_minutes <= 0 {
        errors.push("Duration must be a positive number of minutes.");
    } else if duration_minutes > MAX_DURATION_MINUTES {
        errors.push("Duration cannot exceed 1440 minutes.");
    }
    if !errors.is_empty() {
        return Err(Error::validation(errors.join(" ")));
    }

    let course = store.find_course(course_id).await?.ok_or_else(|| Error::NotFound {
        message: "Course not found".to_string(),
    })?;
    // interns run sessions for any course, faculty only for their own
    if session.role == Role::Faculty {
        authorize(session, STAFF, Some(course.faculty_id))?;
    }

    let code = generate_code();
    let started_at = Utc::now();
    let session_id = store
        .insert_attendance_session(NewAttendanceSession {
            course_id,
            session_datetime: started_at,
            attendance_code: code.clone(),
            duration_minutes,
            created_by_user_id: session.user_id,
        })
        .await?;

    log::info!(
        "{} opened attendance session {} for {} ({} min)",
        session.email,
        session_id,
        course.course_code,
        duration_minutes
    );
    Ok(OpenedSession {
        session_id,
        course_id,
        code,
        duration_minutes,
        started_at,
        closes_at: started_at + chrono::Duration::minutes(i64::from(duration_minutes)),
    })
}

/// Compare-and-set on the active flag. Wrong id, wrong creator and already
/// ended all report the same failure.
pub async fn end_session(
    store: &dyn Store,
    session: &AuthSession,
    session_id: i64,
) -> Result<(), Error> {
    authorize(session, STAFF, None)?;
    if session_id <= 0 {
        return Err(Error::validation("Invalid session id"));
    }

    match store.end_attendance_session(session_id, session.user_id).await? {
        0 => Err(Error::not_found_or_forbidden(
            "Session not found or not active/authorized to end.",
        )),
        _ => {
            log::info!("{} ended attendance session {}", session.email, session_id);
            Ok(())
        }
    }
}

pub async fn check_in(store: &dyn Store, session: &AuthSession, code: &str) -> Result<CheckIn, Error> {
    check_in_at(store, session, code, Utc::now()).await
}

pub async fn check_in_at(
    store: &dyn Store,
    session: &AuthSession,
    code: &str,
    now: DateTime<Utc>,
) -> Result<CheckIn, Error> {
    authorize(session, STUDENTS, None)?;

    let code = normalize_code(code);
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::validation(
            "Attendance code must be 6 characters (0-9, A-F).",
        ));
    }

    let mut target = None;
    for candidate in store.active_sessions_with_code(&code).await? {
        if candidate.accepts_check_in(now)
            && store.is_enrolled(candidate.course_id, session.user_id).await?
        {
            target = Some(candidate);
            break;
        }
    }
    let target = target.ok_or_else(|| {
        Error::not_found_or_forbidden("Invalid or expired attendance code.")
    })?;

    match store
        .insert_attendance_record(target.id, session.user_id, now)
        .await
    {
        Ok(()) => {
            log::info!("{} checked in to session {}", session.email, target.id);
            Ok(CheckIn {
                session_id: target.id,
                course_id: target.course_id,
                check_in_time: now,
            })
        }
        Err(StoreError::UniqueViolation) => Err(Error::conflict(
            "Attendance already recorded for this session.",
        )),
        Err(err) => Err(err.into()),
    }
}

/// Every session of the course, newest first, marked present or absent for
/// the calling student.
pub async fn detailed_report(
    store: &dyn Store,
    session: &AuthSession,
    course_id: i64,
) -> Result<Vec<SessionAttendance>, Error> {
    authorize(session, STUDENTS, None)?;
    if course_id <= 0 {
        return Err(Error::validation("Invalid course id"));
    }
    if !store.is_enrolled(course_id, session.user_id).await? {
        return Err(Error::unauthorized("Not enrolled in this course."));
    }

    Ok(store
        .session_check_ins(course_id, session.user_id)
        .await?
        .into_iter()
        .map(|row| SessionAttendance {
            session_id: row.session_id,
            session_datetime: row.session_datetime,
            status: match row.check_in_time {
                Some(_) => AttendanceStatus::Present,
                None => AttendanceStatus::Absent,
            },
            check_in_time: row.check_in_time,
        })
        .collect())
}

pub async fn summary_report(
    store: &dyn Store,
    session: &AuthSession,
) -> Result<Vec<CourseAttendance>, Error> {
    authorize(session, STUDENTS, None)?;
    Ok(store
        .attendance_counts(session.user_id)
        .await?
        .into_iter()
        .map(|row| CourseAttendance {
            attendance_percent: attendance_percent(row.sessions_attended, row.total_sessions),
            course_id: row.course_id,
            course_code: row.course_code,
            title: row.title,
            total_sessions: row.total_sessions,
            sessions_attended: row.sessions_attended,
        })
        .collect())
}
