use crate::err::Error;
use crate::gate::{authorize, FACULTY, STAFF, STUDENTS};
use crate::models::{AuthSession, Course, CourseSearchHit, NewCourse, StudentCourse};
use crate::store::Store;

pub const SEARCH_LIMIT: i64 = 100;

const MAX_CODE_LEN: usize = 100;
const MAX_TITLE_LEN: usize = 255;
const MAX_QUERY_LEN: usize = 100;

pub async fn create_course(
    store: &dyn Store,
    session: &AuthSession,
    course_code: &str,
    title: &str,
    term: Option<&str>,
) -> Result<i64, Error> {
    authorize(session, FACULTY, None)?;

    let course_code = course_code.trim();
    let title = title.trim();
    let term = term.map(str::trim).filter(|t| !t.is_empty());

    let mut errors = Vec::new();
    if course_code.is_empty() || title.is_empty() {
        errors.push("Course code and title are required.");
    }
    if course_code.chars().count() > MAX_CODE_LEN {
        errors.push("Course code cannot exceed 100 characters.");
    }
    if title.chars().count() > MAX_TITLE_LEN {
        errors.push("Course title cannot exceed 255 characters.");
    }
    if term.map_or(false, |t| t.chars().count() > MAX_CODE_LEN) {
        errors.push("Term cannot exceed 100 characters.");
    }
    if !errors.is_empty() {
        return Err(Error::validation(errors.join(" ")));
    }

    let id = store
        .insert_course(NewCourse {
            course_code: course_code.to_string(),
            title: title.to_string(),
            term: term.map(str::to_string),
            faculty_id: session.user_id,
        })
        .await?;
    log::info!("{} created course {} ({})", session.email, course_code, id);
    Ok(id)
}

pub async fn faculty_courses(store: &dyn Store, session: &AuthSession) -> Result<Vec<Course>, Error> {
    authorize(session, STAFF, None)?;
    Ok(store.faculty_courses(session.user_id).await?)
}

pub async fn student_courses(
    store: &dyn Store,
    session: &AuthSession,
) -> Result<Vec<StudentCourse>, Error> {
    authorize(session, STUDENTS, None)?;
    Ok(store.student_courses(session.user_id).await?)
}

/// Case-insensitive substring match over code, title and faculty name. An
/// empty query lists every course, up to [`SEARCH_LIMIT`].
pub async fn search_courses(
    store: &dyn Store,
    session: &AuthSession,
    query: &str,
) -> Result<Vec<CourseSearchHit>, Error> {
    authorize(session, STUDENTS, None)?;
    let query = query.trim();
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(Error::validation("Search text cannot exceed 100 characters."));
    }
    Ok(store
        .search_courses(session.user_id, query, SEARCH_LIMIT)
        .await?)
}
