//! Role and ownership policy consulted before every mutation and privileged
//! read.

use crate::err::Error;
use crate::models::{AuthSession, Role};

pub const STUDENTS: &[Role] = &[Role::Student];
pub const FACULTY: &[Role] = &[Role::Faculty];
pub const STAFF: &[Role] = &[Role::Faculty, Role::FacultyIntern];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The caller's role is not in the required set.
    Unauthorized { required: &'static [Role] },
    /// The role fits but the resource belongs to someone else.
    NotPermitted,
}

/// Roles are checked first; `owner`, when given, must be the caller.
pub fn authorize(
    session: &AuthSession,
    required: &'static [Role],
    owner: Option<i64>,
) -> Result<(), Denial> {
    if !required.contains(&session.role) {
        return Err(Denial::Unauthorized { required });
    }
    match owner {
        Some(owner) if owner != session.user_id => Err(Denial::NotPermitted),
        _ => Ok(()),
    }
}

impl From<Denial> for Error {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthorized { required } => {
                let roles: Vec<&str> = required.iter().map(Role::as_str).collect();
                Error::unauthorized(format!("Unauthorized: {} only", roles.join(" or ")))
            }
            Denial::NotPermitted => Error::unauthorized("Not permitted for this resource"),
        }
    }
}
