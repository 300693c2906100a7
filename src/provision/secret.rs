//! Rotated secret provisioning
//!
//! Each load goes collect → confirm → build request → submit → report. Single
//! loads collect values from the operator; bulk loads read them from a CSV
//! file whose columns are, in order:
//!
//! `template, path, secret_name, line_of_business, app_team, itpm,
//! description, app_id, owner1, owner2, owner3`
//!
//! A non-empty `path` column is used as-is and parsed back into its naming
//! parts instead of being synthesized from the other columns.

use super::Provisioned;
use crate::api::models::CreateRotatedSecret;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::naming::{AppInfo, normalize_team_name};
use crate::prompts::{Prompter, split_list};
use crate::success;
use std::fmt;
use std::path::{Path, PathBuf};

/// Days between automatic rotations.
pub const ROTATION_INTERVAL_DAYS: u32 = 90;

/// Columns a bulk file must provide; `owner3` may be left off.
pub const BULK_COLUMNS: usize = 11;
const REQUIRED_BULK_COLUMNS: usize = BULK_COLUMNS - 1;

/// Everything needed to create one rotated secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRequest {
    pub path: String,
    pub tags: Vec<String>,
    pub description: String,
    pub app_info: AppInfo,
}

/// One data row of a bulk load file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRow {
    /// Row number in the file, counting the header as row 1.
    pub line: u64,
    pub template: String,
    pub path: String,
    pub secret_name: String,
    pub line_of_business: String,
    pub app_team_name: String,
    pub itpm: String,
    pub description: String,
    pub app_id: String,
    pub owners: [String; 3],
}

impl SecretRow {
    fn from_record(record: &csv::StringRecord, line: u64) -> Result<Self> {
        if record.len() < REQUIRED_BULK_COLUMNS {
            return Err(ProvisionError::InvalidInput(format!(
                "Row {line} has {} columns; expected {BULK_COLUMNS}",
                record.len()
            )));
        }
        let field = |i: usize| record.get(i).unwrap_or_default().trim().to_string();

        Ok(Self {
            line,
            template: field(0),
            path: field(1),
            secret_name: field(2),
            line_of_business: field(3),
            app_team_name: field(4),
            itpm: field(5),
            description: field(6),
            app_id: field(7),
            owners: [field(8), field(9), field(10)],
        })
    }

    /// Naming parts, from the explicit path when present.
    pub fn app_info(&self) -> Result<AppInfo> {
        if self.path.is_empty() {
            Ok(AppInfo {
                line_of_business: self.line_of_business.clone(),
                app_team_name: self.app_team_name.clone(),
                itpm: self.itpm.clone(),
                secret_name: self.secret_name.clone(),
                app_id: self.app_id.clone(),
            })
        } else {
            AppInfo::from_secret_path(&self.path, &self.app_id)
        }
    }

    /// `owner1`, `owner2`, the session defaults, then `owner3` when given.
    #[must_use]
    pub fn tags(&self, defaults: &[String]) -> Vec<String> {
        let [owner1, owner2, owner3] = &self.owners;
        let mut tags = vec![format!("owner1:{owner1}"), format!("owner2:{owner2}")];
        tags.extend_from_slice(defaults);
        if !owner3.is_empty() {
            tags.push(format!("owner3:{owner3}"));
        }
        tags
    }
}

/// Read every data row of a bulk load file, in file order.
///
/// The header row must have [`BULK_COLUMNS`] columns; its names are not
/// checked. A bad header or unreadable file fails the whole load, while a
/// bad data row comes back as its own error so the others can still load.
pub fn read_bulk_file(path: &Path) -> Result<Vec<Result<SecretRow>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let header_len = reader.headers()?.len();
    if header_len < BULK_COLUMNS {
        return Err(ProvisionError::InvalidInput(format!(
            "{} has {header_len} header columns; expected {BULK_COLUMNS}",
            path.display()
        )));
    }

    let rows = reader
        .records()
        .map(|record| {
            let record = record?;
            let line = record.position().map(csv::Position::line).unwrap_or_default();
            SecretRow::from_record(&record, line)
        })
        .collect();
    Ok(rows)
}

/// Default description used when none is given.
#[must_use]
pub fn default_secret_description(config: &ProvisionConfig, app: &AppInfo) -> String {
    format!(
        "Default description - This secret belongs to the azure app {}; App ID: {}. \
         For support please contact {}. Script version: {}.",
        app.app_team_name.to_uppercase(),
        app.app_id,
        config.engineer.email,
        config.version
    )
}

fn finish_request(
    config: &ProvisionConfig,
    path: String,
    app_info: AppInfo,
    tags: Vec<String>,
    description: String,
) -> SecretRequest {
    let description = if description.trim().is_empty() {
        default_secret_description(config, &app_info)
    } else {
        description
    };
    SecretRequest {
        path,
        tags,
        description,
        app_info,
    }
}

/// Build the request for one bulk row.
pub fn request_from_row(config: &ProvisionConfig, row: &SecretRow) -> Result<SecretRequest> {
    let app_info = row.app_info().map_err(|e| match e {
        ProvisionError::InvalidInput(msg) => {
            ProvisionError::InvalidInput(format!("Row {}: {msg}", row.line))
        }
        other => other,
    })?;
    let path = if row.path.is_empty() {
        app_info.secret_path()
    } else {
        row.path.clone()
    };
    let tags = row.tags(&config.default_tags);
    Ok(finish_request(
        config,
        path,
        app_info,
        tags,
        row.description.clone(),
    ))
}

/// Ask the operator for a single secret's values.
pub fn collect_interactive(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
) -> Result<SecretRequest> {
    let app_id = prompter.text("Azure Application ID: ")?.to_lowercase();
    let secret_name = prompter.text("Secret Name: ")?.to_lowercase();
    let line_of_business = prompter.text("Line of Business: ")?.to_lowercase();
    let app_team_name = loop {
        let team = normalize_team_name(&prompter.text("Team Name: ")?);
        if !team.is_empty() {
            break team;
        }
    };
    let itpm = prompter.text("ITPM Number: ")?.to_lowercase();
    let mut tags = prompter.list("Tags (comma separated list): ")?;
    tags.iter_mut().for_each(|t| *t = t.to_lowercase());
    tags.extend(config.default_tags.iter().cloned());

    let app_info = AppInfo {
        line_of_business,
        app_team_name,
        itpm,
        secret_name,
        app_id,
    };
    Ok(finish_request(
        config,
        app_info.secret_path(),
        app_info,
        tags,
        String::new(),
    ))
}

/// Show the values and ask to continue. Skipped in testing mode.
pub fn confirm_request(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    request: &SecretRequest,
) -> Result<()> {
    if config.is_testing {
        return Ok(());
    }

    let app = &request.app_info;
    prompter.say(&format!(
        "\tapplication_id={}\n\tsecret_name={}\n\tline_of_business={}\n\tapp_team_name={}\n\titpm={}\n\tdescription={}\n\ttags={:?}",
        app.app_id,
        app.secret_name,
        app.line_of_business,
        app.app_team_name,
        app.itpm,
        request.description,
        request.tags
    ))?;
    if prompter.confirm("Are these values correct?")? {
        Ok(())
    } else {
        Err(ProvisionError::Aborted)
    }
}

/// Request body for `create-rotated-secret`.
#[must_use]
pub fn build_body(config: &ProvisionConfig, request: &SecretRequest) -> CreateRotatedSecret {
    CreateRotatedSecret {
        name: request.path.clone(),
        target_name: config.rotation_target.clone(),
        description: request.description.clone(),
        authentication_credentials: "use-target-creds".to_string(),
        rotator_type: "api-key".to_string(),
        application_id: request.app_info.app_id.clone(),
        rotation_interval: ROTATION_INTERVAL_DAYS.to_string(),
        auto_rotate: "true".to_string(),
        rotate_after_disconnect: "true".to_string(),
        tags: request.tags.clone(),
        token: config.auth_token.clone(),
    }
}

/// Submit one rotated secret.
pub async fn add_rotated_secret(
    config: &ProvisionConfig,
    request: &SecretRequest,
) -> Provisioned<String> {
    let body = build_body(config, request);
    let result = config
        .api
        .create_rotated_secret(&body)
        .await
        .map(|()| request.path.clone());

    let outcome = Provisioned::classify(
        result,
        || request.path.clone(),
        &config.error_log,
        &format!("Secret Path: {}", request.path),
    );
    match &outcome {
        Provisioned::Created(path) => success!("Successfully loaded {path}"),
        Provisioned::AlreadyExists(path) => crate::warn!("The secret {path} already exists"),
        Provisioned::Failed(_) => {}
    }
    outcome
}

/// Result of a single or bulk load.
#[derive(Debug, Clone, Default)]
pub struct SecretLoad {
    /// Paths created or found already present, in load order.
    pub paths: Vec<String>,
    /// Naming parts of the last loaded secret.
    pub app_info: Option<AppInfo>,
}

impl SecretLoad {
    fn record(&mut self, outcome: Provisioned<String>, app_info: AppInfo) {
        if let Some(path) = outcome.into_value() {
            self.paths.push(path);
        }
        self.app_info = Some(app_info);
    }
}

pub async fn load_single(config: &ProvisionConfig, prompter: &mut Prompter) -> Result<SecretLoad> {
    let request = collect_interactive(config, prompter)?;
    confirm_request(config, prompter, &request)?;

    let mut load = SecretLoad::default();
    let outcome = add_rotated_secret(config, &request).await;
    load.record(outcome, request.app_info);
    Ok(load)
}

/// Load every row of `csv_path`, or of the configured/prompted file.
pub async fn load_bulk(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    csv_path: Option<PathBuf>,
) -> Result<SecretLoad> {
    let csv_path = match csv_path.or_else(|| config.default_bulk_file.clone()) {
        Some(path) => path,
        None => PathBuf::from(expand_path(
            &prompter.text("Input the absolute path of the csv file to upload: ")?,
        )?),
    };

    let rows = read_bulk_file(&csv_path)?;
    tracing::debug!(file = %csv_path.display(), rows = rows.len(), "bulk load");

    let mut load = SecretLoad::default();
    for row in rows {
        let request = match row.and_then(|row| request_from_row(config, &row)) {
            Ok(request) => request,
            Err(e) => {
                config
                    .error_log
                    .record(&format!("Bulk File: {}", csv_path.display()), &e);
                continue;
            }
        };
        confirm_request(config, prompter, &request)?;
        let outcome = add_rotated_secret(config, &request).await;
        load.record(outcome, request.app_info);
    }
    Ok(load)
}

/// How secrets are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Single,
    Bulk,
}

impl LoadMode {
    pub const ALL: [Self; 2] = [Self::Single, Self::Bulk];
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "Single Secret Load",
            Self::Bulk => "Bulk Secret Load",
        })
    }
}

/// Ask for the load mode and run it.
pub async fn choose_secret_option(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
) -> Result<SecretLoad> {
    let mode = *prompter.choose_one(&LoadMode::ALL, "Select a number for the load type:")?;
    match mode {
        LoadMode::Single => load_single(config, prompter).await,
        LoadMode::Bulk => load_bulk(config, prompter, None).await,
    }
}

/// Expand a leading `~` in an operator-supplied path.
pub fn expand_path(path: &str) -> Result<String> {
    let expanded = shellexpand::tilde(path.trim()).to_string();
    if path.trim().starts_with('~') && expanded.starts_with('~') {
        return Err(ProvisionError::InvalidInput(
            "Could not expand ~ in path (HOME environment variable not set).\n\
             Please use an absolute path instead."
                .to_string(),
        ));
    }
    Ok(expanded)
}

/// Parse a comma-separated tag string the way the prompts do.
#[must_use]
pub fn parse_tags(raw: &str) -> Vec<String> {
    split_list(&raw.to_lowercase())
}
