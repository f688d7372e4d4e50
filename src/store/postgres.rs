use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use super::{Store, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::models::{
    AttendanceSession, AuthSession, Course, CourseAttendanceCounts, CourseSearchHit, Enrollment,
    NewAttendanceSession, NewCourse, NewUser, PendingRequest, SessionCheckIn,
    StudentCourse, User,
};

const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = "id, fullname, email, role, password_hash, remember_token_hash, \
                            token_expires, created_at";

const SESSION_COLUMNS: &str = "id, course_id, session_datetime, attendance_code, \
                               duration_minutes, is_active, created_by_user_id";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::UniqueViolation;
            }
        }
        StoreError::Database(err.to_string())
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Escapes LIKE wildcards so user text only ever matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (fullname, email, role, password_hash) VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(&user.fullname)
        .bind(&user.email)
        .bind(user.role)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1 LIMIT 1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_remember_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE remember_token_hash = $1 LIMIT 1",
            USER_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_remember_token(
        &self,
        user_id: i64,
        token: Option<(&str, DateTime<Utc>)>,
    ) -> StoreResult<()> {
        let (hash, expires) = match token {
            Some((hash, expires)) => (Some(hash), Some(expires)),
            None => (None, None),
        };
        sqlx::query("UPDATE users SET remember_token_hash = $1, token_expires = $2 WHERE id = $3")
            .bind(hash)
            .bind(expires)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_login_session(&self, session: &AuthSession) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO user_sessions (ssid, user_id, email, fullname, role, csrf_token, login_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&session.ssid)
        .bind(session.user_id)
        .bind(&session.email)
        .bind(&session.fullname)
        .bind(session.role)
        .bind(&session.csrf_token)
        .bind(session.login_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_login_session(&self, ssid: &str) -> StoreResult<Option<AuthSession>> {
        let session = sqlx::query_as::<_, AuthSession>(
            "SELECT ssid, user_id, email, fullname, role, csrf_token, login_at \
             FROM user_sessions WHERE ssid = $1 LIMIT 1",
        )
        .bind(ssid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_login_session(&self, ssid: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM user_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired_login_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM user_sessions WHERE login_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO courses (course_code, title, term, faculty_id) VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(&course.course_code)
        .bind(&course.title)
        .bind(&course.term)
        .bind(course.faculty_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_course(&self, course_id: i64) -> StoreResult<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT id, course_code, title, term, faculty_id, created_at FROM courses \
             WHERE id = $1 LIMIT 1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course)
    }

    async fn faculty_courses(&self, faculty_id: i64) -> StoreResult<Vec<Course>> {
        let courses = sqlx::query_as::<_, Course>(
            "SELECT id, course_code, title, term, faculty_id, created_at FROM courses \
             WHERE faculty_id = $1 ORDER BY course_code ASC",
        )
        .bind(faculty_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(courses)
    }

    async fn student_courses(&self, student_id: i64) -> StoreResult<Vec<StudentCourse>> {
        let courses = sqlx::query_as::<_, StudentCourse>(
            "SELECT c.id AS course_id, c.course_code, c.title, c.term, \
                    u.fullname AS faculty_name, e.enrolled_at \
             FROM course_enrollments e \
             JOIN courses c ON e.course_id = c.id \
             LEFT JOIN users u ON c.faculty_id = u.id \
             WHERE e.student_id = $1 \
             ORDER BY c.course_code ASC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(courses)
    }

    async fn search_courses(
        &self,
        student_id: i64,
        query: &str,
        limit: i64,
    ) -> StoreResult<Vec<CourseSearchHit>> {
        let hits = sqlx::query_as::<_, CourseSearchHit>(
            "SELECT c.id AS course_id, c.course_code, c.title, c.term, \
                    u.fullname AS faculty_name, jr.status AS request_status, \
                    EXISTS (SELECT 1 FROM course_enrollments e \
                            WHERE e.course_id = c.id AND e.student_id = $1) AS enrolled \
             FROM courses c \
             LEFT JOIN users u ON c.faculty_id = u.id \
             LEFT JOIN join_requests jr ON jr.course_id = c.id AND jr.student_id = $1 \
             WHERE c.course_code ILIKE $2 OR c.title ILIKE $2 OR u.fullname ILIKE $2 \
             ORDER BY c.course_code ASC \
             LIMIT $3",
        )
        .bind(student_id)
        .bind(like_pattern(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(hits)
    }

    async fn is_enrolled(&self, course_id: i64, student_id: i64) -> StoreResult<bool> {
        let enrolled = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM course_enrollments \
                            WHERE course_id = $1 AND student_id = $2)",
        )
        .bind(course_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(enrolled)
    }

    async fn insert_join_request(
        &self,
        course_id: i64,
        faculty_id: i64,
        student_id: i64,
    ) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO join_requests (course_id, faculty_id, student_id, status) \
             VALUES ($1, $2, $3, 'pending') RETURNING id",
        )
        .bind(course_id)
        .bind(faculty_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn pending_requests(&self, faculty_id: i64) -> StoreResult<Vec<PendingRequest>> {
        let rows = sqlx::query_as::<_, PendingRequest>(
            "SELECT jr.id AS request_id, jr.course_id, jr.student_id, jr.status, jr.created_at, \
                    c.course_code, c.title AS course_title, u.fullname AS student_name \
             FROM join_requests jr \
             JOIN courses c ON jr.course_id = c.id \
             JOIN users u ON jr.student_id = u.id \
             WHERE jr.faculty_id = $1 AND jr.status = 'pending' \
             ORDER BY jr.created_at ASC, jr.id ASC",
        )
        .bind(faculty_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn approve_join_request(
        &self,
        request_id: i64,
        faculty_id: i64,
    ) -> StoreResult<Option<Enrollment>> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_as::<_, (i64, i64)>(
            "UPDATE join_requests SET status = 'approved' \
             WHERE id = $1 AND faculty_id = $2 AND status = 'pending' \
             RETURNING course_id, student_id",
        )
        .bind(request_id)
        .bind(faculty_id)
        .fetch_optional(&mut tx)
        .await?;

        let (course_id, student_id) = match claimed {
            Some(row) => row,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        sqlx::query(
            "INSERT INTO course_enrollments (course_id, student_id) VALUES ($1, $2) \
             ON CONFLICT (course_id, student_id) DO NOTHING",
        )
        .bind(course_id)
        .bind(student_id)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(Some(Enrollment {
            course_id,
            student_id,
        }))
    }

    async fn reject_join_request(&self, request_id: i64, faculty_id: i64) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE join_requests SET status = 'rejected' \
             WHERE id = $1 AND faculty_id = $2 AND status = 'pending'",
        )
        .bind(request_id)
        .bind(faculty_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn insert_attendance_session(&self, session: NewAttendanceSession) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO sessions (course_id, session_datetime, attendance_code, \
                                   duration_minutes, is_active, created_by_user_id) \
             VALUES ($1, $2, $3, $4, TRUE, $5) RETURNING id",
        )
        .bind(session.course_id)
        .bind(session.session_datetime)
        .bind(&session.attendance_code)
        .bind(session.duration_minutes)
        .bind(session.created_by_user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn end_attendance_session(&self, session_id: i64, creator_id: i64) -> StoreResult<u64> {
        let res = sqlx::query(
            "UPDATE sessions SET is_active = FALSE \
             WHERE id = $1 AND created_by_user_id = $2 AND is_active = TRUE",
        )
        .bind(session_id)
        .bind(creator_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn active_sessions_with_code(&self, code: &str) -> StoreResult<Vec<AttendanceSession>> {
        let sessions = sqlx::query_as::<_, AttendanceSession>(&format!(
            "SELECT {} FROM sessions WHERE attendance_code = $1 AND is_active = TRUE \
             ORDER BY session_datetime DESC",
            SESSION_COLUMNS
        ))
        .bind(code)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn insert_attendance_record(
        &self,
        session_id: i64,
        student_id: i64,
        check_in_time: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO attendance (session_id, student_id, check_in_time) VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(student_id)
        .bind(check_in_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_check_ins(
        &self,
        course_id: i64,
        student_id: i64,
    ) -> StoreResult<Vec<SessionCheckIn>> {
        let rows = sqlx::query_as::<_, SessionCheckIn>(
            "SELECT s.id AS session_id, s.session_datetime, a.check_in_time \
             FROM sessions s \
             LEFT JOIN attendance a ON a.session_id = s.id AND a.student_id = $1 \
             WHERE s.course_id = $2 \
             ORDER BY s.session_datetime DESC, s.id DESC",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn attendance_counts(&self, student_id: i64) -> StoreResult<Vec<CourseAttendanceCounts>> {
        let rows = sqlx::query_as::<_, CourseAttendanceCounts>(
            "SELECT c.id AS course_id, c.course_code, c.title, \
                    (SELECT COUNT(s.id) FROM sessions s WHERE s.course_id = c.id) \
                        AS total_sessions, \
                    (SELECT COUNT(a.id) FROM attendance a \
                     JOIN sessions s ON a.session_id = s.id \
                     WHERE a.student_id = $1 AND s.course_id = c.id) AS sessions_attended \
             FROM course_enrollments ce \
             JOIN courses c ON ce.course_id = c.id \
             WHERE ce.student_id = $1 \
             ORDER BY c.course_code ASC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RequestStatus, Role};
    use chrono::Duration;
    use rand::{thread_rng, Rng};

    /// Connects to `DATABASE_URL` and applies migrations. Without the variable
    /// the database-backed tests are skipped.
    async fn live_store() -> Option<PgStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PgStore::connect(&DatabaseConfig {
            url,
            max_connections: 2,
            min_connections: 0,
            connect_timeout_secs: 5,
        })
        .await
        .unwrap();
        store.migrate().await.unwrap();
        Some(store)
    }

    fn unique_email() -> String {
        let tag: [u8; 8] = thread_rng().gen();
        format!("{}@ashesi.edu.gh", hex::encode(tag))
    }

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            fullname: "Ama Owusu".to_string(),
            email: email.to_string(),
            role,
            password_hash: "$pbkdf2-sha256$unused".to_string(),
        }
    }

    async fn course_with_student(store: &PgStore) -> (i64, i64, i64) {
        let faculty = store
            .insert_user(new_user(&unique_email(), Role::Faculty))
            .await
            .unwrap();
        let student = store
            .insert_user(new_user(&unique_email(), Role::Student))
            .await
            .unwrap();
        let course = store
            .insert_course(NewCourse {
                course_code: "CS 212".to_string(),
                title: "Computer Organization".to_string(),
                term: None,
                faculty_id: faculty,
            })
            .await
            .unwrap();
        (course, faculty, student)
    }

    async fn enrollment_rows(store: &PgStore, course_id: i64) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM course_enrollments WHERE course_id = $1")
            .bind(course_id)
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    async fn request_status(store: &PgStore, request_id: i64) -> RequestStatus {
        sqlx::query_scalar::<_, RequestStatus>("SELECT status FROM join_requests WHERE id = $1")
            .bind(request_id)
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("cs"), "%cs%");
        assert_eq!(like_pattern("100%_"), "%100\\%\\_%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = match live_store().await {
            Some(store) => store,
            None => return,
        };
        let email = unique_email();
        store
            .insert_user(new_user(&email, Role::Student))
            .await
            .unwrap();
        assert!(matches!(
            store.insert_user(new_user(&email, Role::Faculty)).await,
            Err(StoreError::UniqueViolation)
        ));
    }

    #[tokio::test]
    async fn duplicate_join_request_is_a_unique_violation() {
        let store = match live_store().await {
            Some(store) => store,
            None => return,
        };
        let (course, faculty, student) = course_with_student(&store).await;
        store
            .insert_join_request(course, faculty, student)
            .await
            .unwrap();
        assert!(matches!(
            store.insert_join_request(course, faculty, student).await,
            Err(StoreError::UniqueViolation)
        ));
    }

    #[tokio::test]
    async fn approval_happens_once() {
        let store = match live_store().await {
            Some(store) => store,
            None => return,
        };
        let (course, faculty, student) = course_with_student(&store).await;
        let request = store
            .insert_join_request(course, faculty, student)
            .await
            .unwrap();

        assert_eq!(store.approve_join_request(request, faculty + 1).await.unwrap(), None);
        assert_eq!(request_status(&store, request).await, RequestStatus::Pending);

        assert_eq!(
            store.approve_join_request(request, faculty).await.unwrap(),
            Some(Enrollment {
                course_id: course,
                student_id: student
            })
        );
        assert_eq!(store.approve_join_request(request, faculty).await.unwrap(), None);
        assert_eq!(enrollment_rows(&store, course).await, 1);
        assert_eq!(request_status(&store, request).await, RequestStatus::Approved);
        assert!(!store.reject_join_request(request, faculty).await.unwrap());
    }

    #[tokio::test]
    async fn approval_keeps_an_existing_enrollment() {
        let store = match live_store().await {
            Some(store) => store,
            None => return,
        };
        let (course, faculty, student) = course_with_student(&store).await;
        let request = store
            .insert_join_request(course, faculty, student)
            .await
            .unwrap();
        sqlx::query("INSERT INTO course_enrollments (course_id, student_id) VALUES ($1, $2)")
            .bind(course)
            .bind(student)
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store
            .approve_join_request(request, faculty)
            .await
            .unwrap()
            .is_some());
        assert_eq!(enrollment_rows(&store, course).await, 1);
        assert!(store.is_enrolled(course, student).await.unwrap());
    }

    #[tokio::test]
    async fn ending_a_session_flips_it_once() {
        let store = match live_store().await {
            Some(store) => store,
            None => return,
        };
        let (course, faculty, student) = course_with_student(&store).await;
        let session = store
            .insert_attendance_session(NewAttendanceSession {
                course_id: course,
                session_datetime: Utc::now(),
                attendance_code: "A1B2C3".to_string(),
                duration_minutes: 10,
                created_by_user_id: faculty,
            })
            .await
            .unwrap();

        assert_eq!(store.end_attendance_session(session, student).await.unwrap(), 0);
        assert_eq!(store.end_attendance_session(session, faculty).await.unwrap(), 1);
        assert_eq!(store.end_attendance_session(session, faculty).await.unwrap(), 0);
        assert!(store
            .active_sessions_with_code("A1B2C3")
            .await
            .unwrap()
            .iter()
            .all(|s| s.id != session));
    }

    #[tokio::test]
    async fn second_check_in_is_a_unique_violation() {
        let store = match live_store().await {
            Some(store) => store,
            None => return,
        };
        let (course, faculty, student) = course_with_student(&store).await;
        let session = store
            .insert_attendance_session(NewAttendanceSession {
                course_id: course,
                session_datetime: Utc::now(),
                attendance_code: "D4E5F6".to_string(),
                duration_minutes: 10,
                created_by_user_id: faculty,
            })
            .await
            .unwrap();

        store
            .insert_attendance_record(session, student, Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            store.insert_attendance_record(session, student, Utc::now()).await,
            Err(StoreError::UniqueViolation)
        ));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_login_sessions() {
        let store = match live_store().await {
            Some(store) => store,
            None => return,
        };
        let email = unique_email();
        let user = store
            .insert_user(new_user(&email, Role::Student))
            .await
            .unwrap();
        let now = Utc::now();
        let session = |tag: &str, login_at| AuthSession {
            ssid: format!("{}-{}", tag, email),
            user_id: user,
            email: email.clone(),
            fullname: "Ama Owusu".to_string(),
            role: Role::Student,
            csrf_token: "csrf".to_string(),
            login_at,
        };
        let stale = session("stale", now - Duration::days(30));
        let live = session("live", now);
        store.insert_login_session(&stale).await.unwrap();
        store.insert_login_session(&live).await.unwrap();

        let purged = store
            .purge_expired_login_sessions(now - Duration::hours(1))
            .await
            .unwrap();
        assert!(purged >= 1);
        assert_eq!(store.find_login_session(&stale.ssid).await.unwrap(), None);
        let kept = store.find_login_session(&live.ssid).await.unwrap();
        assert_eq!(kept.map(|s| s.ssid), Some(live.ssid));
    }
}
