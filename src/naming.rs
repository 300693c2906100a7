//! Path conventions shared by the secret, auth-method and role workflows.
//!
//! Every resource belonging to an application lives under
//! `/cvs/{line_of_business}/{app_team_name}-{itpm}/`.

use crate::error::{ProvisionError, Result};
use serde::Serialize;

/// Root segment of every provisioned path.
pub const PATH_ROOT: &str = "cvs";

/// Identity of one application, derived once per run and passed to each
/// provisioning step so the paths they create line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub line_of_business: String,
    pub app_team_name: String,
    pub itpm: String,
    pub secret_name: String,
    pub app_id: String,
}

impl AppInfo {
    /// `{team}-{itpm}` segment used in every path.
    #[must_use]
    pub fn team_segment(&self) -> String {
        format!("{}-{}", self.app_team_name, self.itpm)
    }

    fn base(&self) -> String {
        format!("/{PATH_ROOT}/{}/{}", self.line_of_business, self.team_segment())
    }

    #[must_use]
    pub fn secret_path(&self) -> String {
        format!("{}/secrets/azure/{}", self.base(), self.secret_name)
    }

    /// Glob covering every secret of the application.
    #[must_use]
    pub fn secrets_glob(&self) -> String {
        format!("{}/secrets/*", self.base())
    }

    /// Path of an auth method of the given kind, e.g. `uid` or `azure-ad`.
    #[must_use]
    pub fn auth_method_path(&self, kind: &str) -> String {
        let kind = kind.to_lowercase();
        format!(
            "{}/authmethod/{kind}/{}-{kind}",
            self.base(),
            self.team_segment()
        )
    }

    #[must_use]
    pub fn role_path(&self) -> String {
        format!("{}/roles/{}-read-all", self.base(), self.team_segment())
    }

    /// Recover the parts of a path written as
    /// `/cvs/{lob}/{team}-{itpm}/secrets/azure/{name}`.
    ///
    /// The team segment is split on its first `-`. The application id is not
    /// part of the path and must be supplied.
    pub fn from_secret_path(path: &str, app_id: &str) -> Result<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        let invalid = || {
            ProvisionError::InvalidInput(format!(
                "Secret path '{path}' does not follow /{PATH_ROOT}/<lob>/<team>-<itpm>/secrets/azure/<name>"
            ))
        };

        let [
            "",
            root,
            line_of_business,
            team_segment,
            "secrets",
            "azure",
            secret_name,
        ] = segments.as_slice()
        else {
            return Err(invalid());
        };

        if *root != PATH_ROOT || line_of_business.is_empty() || secret_name.is_empty() {
            return Err(invalid());
        }

        let (app_team_name, itpm) = team_segment.split_once('-').ok_or_else(invalid)?;
        if app_team_name.is_empty() || itpm.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            line_of_business: (*line_of_business).to_string(),
            app_team_name: app_team_name.to_string(),
            itpm: itpm.to_string(),
            secret_name: (*secret_name).to_string(),
            app_id: app_id.to_string(),
        })
    }
}

/// Lower-case a team name and join its words with `-`.
#[must_use]
pub fn normalize_team_name(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
