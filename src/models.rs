use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "student")]
    Student,
    #[serde(rename = "fi")]
    FacultyIntern,
    #[serde(rename = "faculty")]
    Faculty,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::FacultyIntern => "fi",
            Role::Faculty => "faculty",
        }
    }

    /// Landing page the client should navigate to after login.
    pub fn dashboard(&self) -> &'static str {
        match self {
            Role::Student => "S DASHBOARD.html",
            Role::FacultyIntern => "FI DASHBOARD.html",
            Role::Faculty => "F DASHBOARD.html",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "fi" => Ok(Role::FacultyIntern),
            "faculty" => Ok(Role::Faculty),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(UnknownVariant {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }
}

// Both enums live in TEXT columns guarded by CHECK constraints.
macro_rules! text_column {
    ($ty:ty) => {
        impl Type<Postgres> for $ty {
            fn type_info() -> PgTypeInfo {
                <&str as Type<Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <&str as Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $ty {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let raw = <&'r str as Decode<'r, Postgres>>::decode(value)?;
                Ok(raw.parse::<$ty>()?)
            }
        }

        impl<'q> Encode<'q, Postgres> for $ty {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
                <&str as Encode<'q, Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

text_column!(Role);
text_column!(RequestStatus);

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub fullname: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    pub remember_token_hash: Option<String>,
    pub token_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub fullname: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

/// A logged-in user's server-side session row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AuthSession {
    pub ssid: String,
    pub user_id: i64,
    pub email: String,
    pub fullname: String,
    pub role: Role,
    pub csrf_token: String,
    pub login_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub course_code: String,
    pub title: String,
    pub term: Option<String>,
    pub faculty_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub course_code: String,
    pub title: String,
    pub term: Option<String>,
    pub faculty_id: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JoinRequest {
    pub id: i64,
    pub course_id: i64,
    pub faculty_id: i64,
    pub student_id: i64,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Enrollment {
    pub course_id: i64,
    pub student_id: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttendanceSession {
    pub id: i64,
    pub course_id: i64,
    pub session_datetime: DateTime<Utc>,
    pub attendance_code: String,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub created_by_user_id: i64,
}

impl AttendanceSession {
    pub fn closes_at(&self) -> DateTime<Utc> {
        self.session_datetime + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Check-ins are taken while the session is active and its window is open.
    pub fn accepts_check_in(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now >= self.session_datetime && now < self.closes_at()
    }
}

#[derive(Debug, Clone)]
pub struct NewAttendanceSession {
    pub course_id: i64,
    pub session_datetime: DateTime<Utc>,
    pub attendance_code: String,
    pub duration_minutes: i32,
    pub created_by_user_id: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StudentCourse {
    pub course_id: i64,
    pub course_code: String,
    pub title: String,
    pub term: Option<String>,
    pub faculty_name: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CourseSearchHit {
    pub course_id: i64,
    pub course_code: String,
    pub title: String,
    pub term: Option<String>,
    pub faculty_name: Option<String>,
    pub request_status: Option<RequestStatus>,
    pub enrolled: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PendingRequest {
    pub request_id: i64,
    pub course_id: i64,
    pub student_id: i64,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub course_code: String,
    pub course_title: String,
    pub student_name: String,
}

/// One attendance session of a course joined against a single student's check-in.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionCheckIn {
    pub session_id: i64,
    pub session_datetime: DateTime<Utc>,
    pub check_in_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourseAttendanceCounts {
    pub course_id: i64,
    pub course_code: String,
    pub title: String,
    pub total_sessions: i64,
    pub sessions_attended: i64,
}
