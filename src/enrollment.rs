//! Join requests: a student asks, the owning faculty member approves or
//! rejects. `pending` is the only state that accepts a transition.

use crate::err::Error;
use crate::gate::{authorize, FACULTY, STAFF, STUDENTS};
use crate::models::{AuthSession, Enrollment, PendingRequest};
use crate::store::{Store, StoreError};

fn request_hidden() -> Error {
    Error::not_found_or_forbidden("Request not found or not permitted")
}

pub async fn request_join(
    store: &dyn Store,
    session: &AuthSession,
    course_id: i64,
) -> Result<i64, Error> {
    authorize(session, STUDENTS, None)?;
    if course_id <= 0 {
        return Err(Error::validation("Invalid course id"));
    }
    if store.is_enrolled(course_id, session.user_id).await? {
        return Err(Error::conflict("Already enrolled in this course"));
    }

    let course = store.find_course(course_id).await?.ok_or_else(|| Error::NotFound {
        message: "Course not found".to_string(),
    })?;

    match store
        .insert_join_request(course.id, course.faculty_id, session.user_id)
        .await
    {
        Ok(request_id) => {
            log::info!(
                "{} requested to join {} (request {})",
                session.email,
                course.course_code,
                request_id
            );
            Ok(request_id)
        }
        Err(StoreError::UniqueViolation) => Err(Error::conflict(
            "You have already requested to join this course",
        )),
        Err(err) => Err(err.into()),
    }
}

/// Ownership and the pending state are checked by the same statement that
/// flips the status, so absent, foreign and already handled requests are
/// indistinguishable to the caller.
pub async fn approve_request(
    store: &dyn Store,
    session: &AuthSession,
    request_id: i64,
) -> Result<Enrollment, Error> {
    authorize(session, FACULTY, None)?;
    if request_id <= 0 {
        return Err(Error::validation("Invalid request id"));
    }

    let enrollment = store
        .approve_join_request(request_id, session.user_id)
        .await?
        .ok_or_else(request_hidden)?;
    log::info!(
        "{} approved request {}: student {} enrolled in course {}",
        session.email,
        request_id,
        enrollment.student_id,
        enrollment.course_id
    );
    Ok(enrollment)
}

pub async fn reject_request(
    store: &dyn Store,
    session: &AuthSession,
    request_id: i64,
) -> Result<(), Error> {
    authorize(session, FACULTY, None)?;
    if request_id <= 0 {
        return Err(Error::validation("Invalid request id"));
    }

    if !store.reject_join_request(request_id, session.user_id).await? {
        return Err(request_hidden());
    }
    log::info!("{} rejected request {}", session.email, request_id);
    Ok(())
}

pub async fn pending_requests(
    store: &dyn Store,
    session: &AuthSession,
) -> Result<Vec<PendingRequest>, Error> {
    authorize(session, STAFF, None)?;
    Ok(store.pending_requests(session.user_id).await?)
}
