//! Persistence boundary for users, login sessions, courses, join requests and
//! attendance.
//!
//! Every method maps to a single statement or a single transaction. Races are
//! resolved by the backing store: uniqueness constraints surface as
//! [`StoreError::UniqueViolation`] and state transitions are conditional
//! updates whose affected-row count decides the winner.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AttendanceSession, AuthSession, Course, CourseAttendanceCounts, CourseSearchHit, Enrollment,
    NewAttendanceSession, NewCourse, NewUser, PendingRequest, SessionCheckIn,
    StudentCourse, User,
};

pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<i64>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_remember_token(&self, token_hash: &str) -> StoreResult<Option<User>>;

    /// Stores (or clears, with `None`) the hashed remember credential of a user.
    async fn set_remember_token(
        &self,
        user_id: i64,
        token: Option<(&str, DateTime<Utc>)>,
    ) -> StoreResult<()>;

    async fn insert_login_session(&self, session: &AuthSession) -> StoreResult<()>;

    async fn find_login_session(&self, ssid: &str) -> StoreResult<Option<AuthSession>>;

    async fn delete_login_session(&self, ssid: &str) -> StoreResult<()>;

    /// Deletes every login session started at or before `cutoff`. Returns the
    /// number of rows removed.
    async fn purge_expired_login_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn insert_course(&self, course: NewCourse) -> StoreResult<i64>;

    async fn find_course(&self, course_id: i64) -> StoreResult<Option<Course>>;

    async fn faculty_courses(&self, faculty_id: i64) -> StoreResult<Vec<Course>>;

    async fn student_courses(&self, student_id: i64) -> StoreResult<Vec<StudentCourse>>;

    async fn search_courses(
        &self,
        student_id: i64,
        query: &str,
        limit: i64,
    ) -> StoreResult<Vec<CourseSearchHit>>;

    async fn is_enrolled(&self, course_id: i64, student_id: i64) -> StoreResult<bool>;

    /// Inserts a pending request; a second request for the same
    /// (course, student) pair fails with [`StoreError::UniqueViolation`].
    async fn insert_join_request(
        &self,
        course_id: i64,
        faculty_id: i64,
        student_id: i64,
    ) -> StoreResult<i64>;

    async fn pending_requests(&self, faculty_id: i64) -> StoreResult<Vec<PendingRequest>>;

    /// Moves a pending request owned by `faculty_id` to approved and enrolls the
    /// student, atomically. `None` when the request is absent, foreign or
    /// already resolved. An existing enrollment row is left as is.
    async fn approve_join_request(
        &self,
        request_id: i64,
        faculty_id: i64,
    ) -> StoreResult<Option<Enrollment>>;

    /// Moves a pending request owned by `faculty_id` to rejected. Returns
    /// whether a row changed.
    async fn reject_join_request(&self, request_id: i64, faculty_id: i64) -> StoreResult<bool>;

    async fn insert_attendance_session(&self, session: NewAttendanceSession) -> StoreResult<i64>;

    /// Compare-and-set `is_active` from true to false for a session created by
    /// `creator_id`. Returns the number of rows changed.
    async fn end_attendance_session(&self, session_id: i64, creator_id: i64) -> StoreResult<u64>;

    async fn active_sessions_with_code(&self, code: &str) -> StoreResult<Vec<AttendanceSession>>;

    /// A second check-in for the same (session, student) pair fails with
    /// [`StoreError::UniqueViolation`].
    async fn insert_attendance_record(
        &self,
        session_id: i64,
        student_id: i64,
        check_in_time: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// All sessions of a course, newest first, each paired with the student's
    /// check-in if one exists.
    async fn session_check_ins(
        &self,
        course_id: i64,
        student_id: i64,
    ) -> StoreResult<Vec<SessionCheckIn>>;

    async fn attendance_counts(&self, student_id: i64) -> StoreResult<Vec<CourseAttendanceCounts>>;
}
