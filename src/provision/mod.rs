//! Provisioning workflows
//!
//! - `secret` - rotated secrets, single and bulk (CSV) loads
//! - `auth_method` - one builder per identity provider
//! - `role` - access roles, their rules and auth-method associations
//! - `app` - end-to-end application onboarding and the run summary
//! - `menu` - top-level action menu
//!
//! Every create call is a single attempt. A conflict (the item already
//! exists) is reported and treated as success; any other failure is written
//! to the error log and surfaced as [`Provisioned::Failed`] so the run can
//! move on to the next item.

pub mod app;
pub mod auth_method;
pub mod menu;
pub mod role;
pub mod secret;

use crate::error::Result;
use crate::error_log::ErrorLog;

/// Outcome of one create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned<T> {
    /// Created by this run.
    Created(T),
    /// Already present remotely; nothing changed.
    AlreadyExists(T),
    /// Not created; the reason has been logged.
    Failed(String),
}

impl<T> Provisioned<T> {
    /// Classify an API result. Conflicts become `AlreadyExists(existing())`;
    /// other errors are logged under `context` and become `Failed`.
    pub fn classify(
        result: Result<T>,
        existing: impl FnOnce() -> T,
        log: &ErrorLog,
        context: &str,
    ) -> Self {
        match result {
            Ok(value) => Self::Created(value),
            Err(e) if e.is_conflict() => Self::AlreadyExists(existing()),
            Err(e) => {
                log.record(context, &e);
                Self::Failed(e.to_string())
            }
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Created(value) | Self::AlreadyExists(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Created(value) | Self::AlreadyExists(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
