//! Interactive provisioning of rotated secrets, auth methods and access roles
//! against a secrets management service's HTTP API.
//!
//! - [`provision`] - the operator workflows (secrets, auth methods, roles,
//!   full application onboarding, action menu)
//! - [`fetch`] - sample client that reads a rotated secret the way an
//!   application would
//! - [`smoke`] - per-environment create/read/delete check

#[macro_use]
pub mod prompts;

pub mod api;
pub mod config;
pub mod error;
pub mod error_log;
pub mod fetch;
pub mod naming;
pub mod provision;
pub mod smoke;

pub use config::{BootstrapOptions, Environment, ProvisionConfig};
pub use error::{ProvisionError, Result};
pub use naming::AppInfo;
pub use prompts::Prompter;
pub use provision::Provisioned;
