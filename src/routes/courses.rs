use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};

use crate::courses;
use crate::err::{creates, proceeds, Payload};
use crate::models::{Course, CourseSearchHit, StudentCourse};
use crate::routes::extract::{CurrentSession, FormInput, QueryInput};
use crate::routes::AppState;

#[serde_as]
#[derive(Debug, Deserialize)]
pub struct CourseForm {
    #[serde(default)]
    course_code: String,
    #[serde(default)]
    title: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Serialize)]
pub struct CourseCreated {
    message: &'static str,
    course_id: i64,
}

#[derive(Debug, Serialize)]
pub struct FacultyCourses {
    courses: Vec<Course>,
}

#[derive(Debug, Serialize)]
pub struct StudentCourses {
    courses: Vec<StudentCourse>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    courses: Vec<CourseSearchHit>,
}

pub async fn create_course(
    State(state): State<AppState>,
    current: CurrentSession,
    FormInput(form): FormInput<CourseForm>,
) -> Payload<CourseCreated> {
    let session = current.require_csrf(form.csrf_token.as_deref())?;
    let course_id = courses::create_course(
        state.store.as_ref(),
        session,
        &form.course_code,
        &form.title,
        form.term.as_deref(),
    )
    .await?;
    creates(CourseCreated {
        message: "Course created successfully",
        course_id,
    })
}

pub async fn faculty_courses(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Payload<FacultyCourses> {
    let courses = courses::faculty_courses(state.store.as_ref(), &current.session).await?;
    proceeds(FacultyCourses { courses })
}

pub async fn student_courses(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Payload<StudentCourses> {
    let courses = courses::student_courses(state.store.as_ref(), &current.session).await?;
    proceeds(StudentCourses { courses })
}

pub async fn search_courses(
    State(state): State<AppState>,
    current: CurrentSession,
    QueryInput(query): QueryInput<SearchQuery>,
) -> Payload<SearchResults> {
    let courses =
        courses::search_courses(state.store.as_ref(), &current.session, &query.q).await?;
    proceeds(SearchResults { courses })
}
