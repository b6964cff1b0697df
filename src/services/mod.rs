//! Business workflows. Every function takes the acting principal and a
//! connection explicitly and reports failures as [`ServiceError`], which knows
//! nothing about HTTP.

use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    jobs::JobQueueError,
    status::{StateMachine, UnknownVariant},
};

pub mod closure;
pub mod completion;
pub mod customers;
pub mod dispatch;
pub mod feedback;
pub mod installation;
pub mod notifications;
pub mod organizations;
pub mod sla;
pub mod tickets;

/// The authenticated caller on whose behalf a workflow runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub organization_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("invalid {entity} status transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("data integrity error: {0}")]
    Integrity(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("job queue error: {0}")]
    Queue(#[from] JobQueueError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<UnknownVariant> for ServiceError {
    fn from(value: UnknownVariant) -> Self {
        ServiceError::Integrity(value.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub(crate) fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::Validation(message.into())
}

/// Parses a status column loaded from the database.
pub(crate) fn stored<S>(value: &str) -> ServiceResult<S>
where
    S: FromStr<Err = UnknownVariant>,
{
    Ok(value.parse()?)
}

/// Returns `Ok(false)` when `from == to` so callers can treat it as a no-op.
pub(crate) fn check_transition<S: StateMachine>(from: S, to: S) -> ServiceResult<bool> {
    if from == to {
        return Ok(false);
    }
    if from.can_transition_to(to) {
        Ok(true)
    } else {
        Err(ServiceError::InvalidTransition {
            entity: S::ENTITY,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn check_rating(field: &str, value: Option<i32>) -> ServiceResult<()> {
    match value {
        Some(rating) if !(1..=5).contains(&rating) => Err(invalid(format!(
            "{field} must be between 1 and 5"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(skip: Option<i64>, limit: Option<i64>) -> ServiceResult<Self> {
        let skip = skip.unwrap_or(0);
        let limit = limit.unwrap_or(Self::MAX_LIMIT);
        if skip < 0 {
            return Err(invalid("skip must be greater than or equal to 0"));
        }
        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(invalid(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(Self { skip, limit })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: Self::MAX_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{DispatchStatus, JobStatus};

    #[test]
    fn page_defaults_and_bounds() {
        assert_eq!(Page::new(None, None).unwrap(), Page::default());
        assert_eq!(Page::new(Some(20), Some(10)).unwrap(), Page { skip: 20, limit: 10 });
        assert!(Page::new(Some(-1), None).is_err());
        assert!(Page::new(None, Some(0)).is_err());
        assert!(Page::new(None, Some(101)).is_err());
    }

    #[test]
    fn same_status_is_a_no_op() {
        assert!(!check_transition(DispatchStatus::Pending, DispatchStatus::Pending).unwrap());
        assert!(check_transition(DispatchStatus::Pending, DispatchStatus::InTransit).unwrap());
    }

    #[test]
    fn illegal_transition_names_both_ends() {
        let err = check_transition(JobStatus::Completed, JobStatus::Scheduled).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid installation job status transition from completed to scheduled"
        );
    }

    #[test]
    fn ratings_outside_range_are_rejected() {
        assert!(check_rating("overall_rating", Some(5)).is_ok());
        assert!(check_rating("overall_rating", None).is_ok());
        let err = check_rating("technician_rating", Some(6)).unwrap_err();
        assert_eq!(err.to_string(), "technician_rating must be between 1 and 5");
        assert!(check_rating("technician_rating", Some(0)).is_err());
    }

    #[test]
    fn blank_text_is_rejected() {
        assert_eq!(require_text("title", "  pump ").unwrap(), "pump");
        assert!(require_text("title", "   ").is_err());
    }
}
