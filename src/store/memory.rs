//! In-process [`Store`] used by the test suite. A single mutex stands in for
//! the database's statement serialization, so every method is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    AttendanceSession, AuthSession, Course, CourseAttendanceCounts, CourseSearchHit, Enrollment,
    JoinRequest, NewAttendanceSession, NewCourse, NewUser, PendingRequest, RequestStatus, Role,
    SessionCheckIn, StudentCourse, User,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    login_sessions: HashMap<String, AuthSession>,
    courses: Vec<Course>,
    enrollments: Vec<(Enrollment, DateTime<Utc>)>,
    join_requests: Vec<JoinRequest>,
    sessions: Vec<AttendanceSession>,
    attendance: Vec<(i64, i64, DateTime<Utc>)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn enrolled(&self, course_id: i64, student_id: i64) -> bool {
        self.enrollments
            .iter()
            .any(|(e, _)| e.course_id == course_id && e.student_id == student_id)
    }

    fn user_name(&self, user_id: i64) -> Option<String> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.fullname.clone())
    }
}

/// A live login for `user_id`, without going through the session authority.
pub fn signed_in(user_id: i64, role: Role) -> AuthSession {
    AuthSession {
        ssid: format!("ssid-{}", user_id),
        user_id,
        email: format!("user{}@ashesi.edu.gh", user_id),
        fullname: format!("User {}", user_id),
        role,
        csrf_token: format!("csrf-{}", user_id),
        login_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enrolls directly, bypassing the join-request flow.
    pub fn enroll(&self, course_id: i64, student_id: i64) {
        let mut t = self.tables.lock().unwrap();
        if !t.enrolled(course_id, student_id) {
            t.enrollments.push((
                Enrollment {
                    course_id,
                    student_id,
                },
                Utc::now(),
            ));
        }
    }

    pub fn enrollment_count(&self) -> usize {
        self.tables.lock().unwrap().enrollments.len()
    }

    pub fn join_request_count(&self) -> usize {
        self.tables.lock().unwrap().join_requests.len()
    }

    pub fn login_session_count(&self) -> usize {
        self.tables.lock().unwrap().login_sessions.len()
    }

    /// Rewrites a login session's start time, for expiry tests.
    pub fn backdate_login(&self, ssid: &str, login_at: DateTime<Utc>) {
        if let Some(s) = self.tables.lock().unwrap().login_sessions.get_mut(ssid) {
            s.login_at = login_at;
        }
    }

    pub fn join_request(&self, request_id: i64) -> Option<JoinRequest> {
        let t = self.tables.lock().unwrap();
        t.join_requests.iter().find(|r| r.id == request_id).cloned()
    }

    pub fn attendance_session(&self, session_id: i64) -> Option<AttendanceSession> {
        let t = self.tables.lock().unwrap();
        t.sessions.iter().find(|s| s.id == session_id).cloned()
    }

    pub fn backdate_attendance_session(&self, session_id: i64, start: DateTime<Utc>) {
        let mut t = self.tables.lock().unwrap();
        if let Some(s) = t.sessions.iter_mut().find(|s| s.id == session_id) {
            s.session_datetime = start;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<i64> {
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation);
        }
        let id = t.next_id();
        t.users.push(User {
            id,
            fullname: user.fullname,
            email: user.email,
            role: user.role,
            password_hash: user.password_hash,
            remember_token_hash: None,
            token_expires: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_remember_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().unwrap();
        Ok(t.users
            .iter()
            .find(|u| u.remember_token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn set_remember_token(
        &self,
        user_id: i64,
        token: Option<(&str, DateTime<Utc>)>,
    ) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        if let Some(u) = t.users.iter_mut().find(|u| u.id == user_id) {
            u.remember_token_hash = token.map(|(hash, _)| hash.to_string());
            u.token_expires = token.map(|(_, expires)| expires);
        }
        Ok(())
    }

    async fn insert_login_session(&self, session: &AuthSession) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        if t.login_sessions.contains_key(&session.ssid) {
            return Err(StoreError::UniqueViolation);
        }
        t.login_sessions
            .insert(session.ssid.clone(), session.clone());
        Ok(())
    }

    async fn find_login_session(&self, ssid: &str) -> StoreResult<Option<AuthSession>> {
        Ok(self.tables.lock().unwrap().login_sessions.get(ssid).cloned())
    }

    async fn delete_login_session(&self, ssid: &str) -> StoreResult<()> {
        self.tables.lock().unwrap().login_sessions.remove(ssid);
        Ok(())
    }

    async fn purge_expired_login_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.tables.lock().unwrap();
        let before = t.login_sessions.len();
        t.login_sessions.retain(|_, s| s.login_at > cutoff);
        Ok((before - t.login_sessions.len()) as u64)
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<i64> {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        t.courses.push(Course {
            id,
            course_code: course.course_code,
            title: course.title,
            term: course.term,
            faculty_id: course.faculty_id,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn find_course(&self, course_id: i64) -> StoreResult<Option<Course>> {
        let t = self.tables.lock().unwrap();
        Ok(t.courses.iter().find(|c| c.id == course_id).cloned())
    }

    async fn faculty_courses(&self, faculty_id: i64) -> StoreResult<Vec<Course>> {
        let t = self.tables.lock().unwrap();
        let mut courses: Vec<Course> = t
            .courses
            .iter()
            .filter(|c| c.faculty_id == faculty_id)
            .cloned()
            .collect();
        courses.sort_by(|a, b| a.course_code.cmp(&b.course_code));
        Ok(courses)
    }

    async fn student_courses(&self, student_id: i64) -> StoreResult<Vec<StudentCourse>> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<StudentCourse> = t
            .enrollments
            .iter()
            .filter(|(e, _)| e.student_id == student_id)
            .filter_map(|(e, enrolled_at)| {
                let c = t.courses.iter().find(|c| c.id == e.course_id)?;
                Some(StudentCourse {
                    course_id: c.id,
                    course_code: c.course_code.clone(),
                    title: c.title.clone(),
                    term: c.term.clone(),
                    faculty_name: t.user_name(c.faculty_id),
                    enrolled_at: *enrolled_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.course_code.cmp(&b.course_code));
        Ok(rows)
    }

    async fn search_courses(
        &self,
        student_id: i64,
        query: &str,
        limit: i64,
    ) -> StoreResult<Vec<CourseSearchHit>> {
        let t = self.tables.lock().unwrap();
        let needle = query.to_lowercase();
        let mut hits: Vec<CourseSearchHit> = t
            .courses
            .iter()
            .filter_map(|c| {
                let faculty_name = t.user_name(c.faculty_id);
                let matches = c.course_code.to_lowercase().contains(&needle)
                    || c.title.to_lowercase().contains(&needle)
                    || faculty_name
                        .as_deref()
                        .map_or(false, |n| n.to_lowercase().contains(&needle));
                if !matches {
                    return None;
                }
                let request_status = t
                    .join_requests
                    .iter()
                    .find(|r| r.course_id == c.id && r.student_id == student_id)
                    .map(|r| r.status);
                Some(CourseSearchHit {
                    course_id: c.id,
                    course_code: c.course_code.clone(),
                    title: c.title.clone(),
                    term: c.term.clone(),
                    faculty_name,
                    request_status,
                    enrolled: t.enrolled(c.id, student_id),
                })
            })
            .collect();
        hits.sort_by(|a, b| a.course_code.cmp(&b.course_code));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn is_enrolled(&self, course_id: i64, student_id: i64) -> StoreResult<bool> {
        Ok(self.tables.lock().unwrap().enrolled(course_id, student_id))
    }

    async fn insert_join_request(
        &self,
        course_id: i64,
        faculty_id: i64,
        student_id: i64,
    ) -> StoreResult<i64> {
        let mut t = self.tables.lock().unwrap();
        if t
            .join_requests
            .iter()
            .any(|r| r.course_id == course_id && r.student_id == student_id)
        {
            return Err(StoreError::UniqueViolation);
        }
        let id = t.next_id();
        t.join_requests.push(JoinRequest {
            id,
            course_id,
            faculty_id,
            student_id,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn pending_requests(&self, faculty_id: i64) -> StoreResult<Vec<PendingRequest>> {
        let t = self.tables.lock().unwrap();
        Ok(t.join_requests
            .iter()
            .filter(|r| r.faculty_id == faculty_id && r.status == RequestStatus::Pending)
            .filter_map(|r| {
                let c = t.courses.iter().find(|c| c.id == r.course_id)?;
                Some(PendingRequest {
                    request_id: r.id,
                    course_id: r.course_id,
                    student_id: r.student_id,
                    status: r.status,
                    created_at: r.created_at,
                    course_code: c.course_code.clone(),
                    course_title: c.title.clone(),
                    student_name: t.user_name(r.student_id)?,
                })
            })
            .collect())
    }

    async fn approve_join_request(
        &self,
        request_id: i64,
        faculty_id: i64,
    ) -> StoreResult<Option<Enrollment>> {
        let mut t = self.tables.lock().unwrap();
        let request = t.join_requests.iter_mut().find(|r| {
            r.id == request_id && r.faculty_id == faculty_id && r.status == RequestStatus::Pending
        });
        let enrollment = match request {
            Some(r) => {
                r.status = RequestStatus::Approved;
                Enrollment {
                    course_id: r.course_id,
                    student_id: r.student_id,
                }
            }
            None => return Ok(None),
        };
        if !t.enrolled(enrollment.course_id, enrollment.student_id) {
            t.enrollments.push((enrollment, Utc::now()));
        }
        Ok(Some(enrollment))
    }

    async fn reject_join_request(&self, request_id: i64, faculty_id: i64) -> StoreResult<bool> {
        let mut t = self.tables.lock().unwrap();
        match t.join_requests.iter_mut().find(|r| {
            r.id == request_id && r.faculty_id == faculty_id && r.status == RequestStatus::Pending
        }) {
            Some(r) => {
                r.status = RequestStatus::Rejected;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_attendance_session(&self, session: NewAttendanceSession) -> StoreResult<i64> {
        let mut t = self.tables.lock().unwrap();
        let id = t.next_id();
        t.sessions.push(AttendanceSession {
            id,
            course_id: session.course_id,
            session_datetime: session.session_datetime,
            attendance_code: session.attendance_code,
            duration_minutes: session.duration_minutes,
            is_active: true,
            created_by_user_id: session.created_by_user_id,
        });
        Ok(id)
    }

    async fn end_attendance_session(&self, session_id: i64, creator_id: i64) -> StoreResult<u64> {
        let mut t = self.tables.lock().unwrap();
        let mut affected = 0;
        for s in t.sessions.iter_mut().filter(|s| {
            s.id == session_id && s.created_by_user_id == creator_id && s.is_active
        }) {
            s.is_active = false;
            affected += 1;
        }
        Ok(affected)
    }

    async fn active_sessions_with_code(&self, code: &str) -> StoreResult<Vec<AttendanceSession>> {
        let t = self.tables.lock().unwrap();
        let mut sessions: Vec<AttendanceSession> = t
            .sessions
            .iter()
            .filter(|s| s.attendance_code == code && s.is_active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.session_datetime.cmp(&a.session_datetime));
        Ok(sessions)
    }

    async fn insert_attendance_record(
        &self,
        session_id: i64,
        student_id: i64,
        check_in_time: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        if t
            .attendance
            .iter()
            .any(|(s, st, _)| *s == session_id && *st == student_id)
        {
            return Err(StoreError::UniqueViolation);
        }
        t.attendance.push((session_id, student_id, check_in_time));
        Ok(())
    }

    async fn session_check_ins(
        &self,
        course_id: i64,
        student_id: i64,
    ) -> StoreResult<Vec<SessionCheckIn>> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<SessionCheckIn> = t
            .sessions
            .iter()
            .filter(|s| s.course_id == course_id)
            .map(|s| SessionCheckIn {
                session_id: s.id,
                session_datetime: s.session_datetime,
                check_in_time: t
                    .attendance
                    .iter()
                    .find(|(sid, st, _)| *sid == s.id && *st == student_id)
                    .map(|(_, _, at)| *at),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.session_datetime
                .cmp(&a.session_datetime)
                .then(b.session_id.cmp(&a.session_id))
        });
        Ok(rows)
    }

    async fn attendance_counts(&self, student_id: i64) -> StoreResult<Vec<CourseAttendanceCounts>> {
        let t = self.tables.lock().unwrap();
        let mut rows: Vec<CourseAttendanceCounts> = t
            .enrollments
            .iter()
            .filter(|(e, _)| e.student_id == student_id)
            .filter_map(|(e, _)| {
                let c = t.courses.iter().find(|c| c.id == e.course_id)?;
                let session_ids: Vec<i64> = t
                    .sessions
                    .iter()
                    .filter(|s| s.course_id == c.id)
                    .map(|s| s.id)
                    .collect();
                let attended = t
                    .attendance
                    .iter()
                    .filter(|(sid, st, _)| *st == student_id && session_ids.contains(sid))
                    .count();
                Some(CourseAttendanceCounts {
                    course_id: c.id,
                    course_code: c.course_code.clone(),
                    title: c.title.clone(),
                    total_sessions: session_ids.len() as i64,
                    sessions_attended: attended as i64,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.course_code.cmp(&b.course_code));
        Ok(rows)
    }
}
