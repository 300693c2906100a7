//! Access roles: creation, deny/allow rules and auth method associations

use super::Provisioned;
use super::auth_method::{AuthMethodRecord, groups_sub_claims};
use crate::api::models::{AssocRoleAuthMethod, CreateRole, SetRoleRule};
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::naming::AppInfo;
use crate::prompts::Prompter;
use std::collections::BTreeMap;
use std::fmt;

/// Paths every role is denied, by rule type.
pub const DEFAULT_DENY_RULES: [(RuleType, &str); 3] = [
    (RuleType::Role, "/cvs/iam/asm/roles/admin/asm-admin"),
    (
        RuleType::Item,
        "/cvs/iam/asm/keys/gateway/secretsmanager-gw-uat-dfckey",
    ),
    (RuleType::AuthMethod, "/cvs/iam/asm/authmethod/certs/gateway/*"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    Item,
    AuthMethod,
    Role,
}

impl RuleType {
    pub const ALL: [Self; 3] = [Self::Item, Self::AuthMethod, Self::Role];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "item-rule",
            Self::AuthMethod => "auth-method-rule",
            Self::Role => "role-rule",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    List,
    Create,
    Update,
    Delete,
    Deny,
}

impl Capability {
    /// Capabilities an operator may grant.
    pub const GRANTABLE: [Self; 5] = [
        Self::Read,
        Self::List,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    /// Granted when the operator does not choose.
    pub const DEFAULT_ALLOW: [Self; 2] = [Self::Read, Self::List];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub rule_type: RuleType,
    pub path: String,
    pub capabilities: Vec<Capability>,
}

impl Rule {
    #[must_use]
    pub fn deny(rule_type: RuleType, path: impl Into<String>) -> Self {
        Self {
            rule_type,
            path: path.into(),
            capabilities: vec![Capability::Deny],
        }
    }
}

/// Rules applied in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[must_use]
pub fn default_deny_rules() -> RuleSet {
    let mut rules = RuleSet::default();
    for (rule_type, path) in DEFAULT_DENY_RULES {
        rules.push(Rule::deny(rule_type, path));
    }
    rules
}

/// Let the operator deny further paths, per rule type.
pub fn prompt_deny_rules(prompter: &mut Prompter, rules: &mut RuleSet) -> Result<()> {
    let rule_types = prompter.choose_many(
        &RuleType::ALL,
        "Select the numbers of the rule types to add deny paths for (comma separated):",
    )?;
    for rule_type in rule_types {
        let paths = prompter.optional_list(&format!(
            "Type the paths to deny access to for {rule_type} (comma separated):"
        ))?;
        for path in paths {
            rules.push(Rule::deny(*rule_type, path));
        }
    }
    Ok(())
}

/// Read and list on every secret of the application.
#[must_use]
pub fn allow_rules_for(app: &AppInfo) -> RuleSet {
    let mut rules = RuleSet::default();
    rules.push(Rule {
        rule_type: RuleType::Item,
        path: app.secrets_glob(),
        capabilities: Capability::DEFAULT_ALLOW.to_vec(),
    });
    rules
}

/// Ask for allow paths. A blank capability answer keeps the previous
/// path's capabilities, starting from read and list.
pub fn prompt_allow_rules(prompter: &mut Prompter) -> Result<RuleSet> {
    let mut rules = RuleSet::default();
    let mut capabilities = Capability::DEFAULT_ALLOW.to_vec();

    let rule_types = prompter.choose_many(
        &RuleType::ALL,
        "Select the numbers of the rule types needed (comma separated):",
    )?;
    for rule_type in rule_types {
        let paths = prompter.list(&format!(
            "Type the paths to allow access to for the {rule_type} (comma separated):"
        ))?;
        for path in paths {
            let current: Vec<&str> = capabilities.iter().map(Capability::as_str).collect();
            let chosen = prompter.choose_many(
                &Capability::GRANTABLE,
                &format!(
                    "Select the permissions needed for '{path}' (comma separated) or press enter for {current:?}:"
                ),
            )?;
            if !chosen.is_empty() {
                capabilities = chosen.into_iter().copied().collect();
            }
            rules.push(Rule {
                rule_type: *rule_type,
                path,
                capabilities: capabilities.clone(),
            });
        }
    }
    Ok(rules)
}

/// One `set-role-rule` call per rule. Conflicts are ignored; any other
/// failure is logged and stops the remaining rules.
pub async fn apply_rules(config: &ProvisionConfig, role_path: &str, rules: &RuleSet) -> Result<()> {
    for rule in rules {
        let body = SetRoleRule {
            role_name: role_path.to_string(),
            rule_type: rule.rule_type.as_str().to_string(),
            path: rule.path.clone(),
            capability: rule
                .capabilities
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            token: config.auth_token.clone(),
        };
        tracing::debug!(role = role_path, rule = %rule.rule_type, path = %rule.path, "set role rule");

        match config.api.set_role_rule(&body).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {}
            Err(e) => {
                config.error_log.record(
                    &format!("Role Path: {role_path} {} {}", rule.rule_type, rule.path),
                    &e,
                );
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Create the role at the derived path, or at one the operator types.
pub async fn create_role(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
) -> Result<Provisioned<String>> {
    let role_path = match app {
        Some(app) => app.role_path(),
        None => prompter.text("Role absolute path: ")?,
    };

    let body = CreateRole {
        name: role_path.clone(),
        description: config.default_description.clone(),
        token: config.auth_token.clone(),
    };
    let result = config.api.create_role(&body).await.map(|()| role_path.clone());

    let outcome = Provisioned::classify(
        result,
        || role_path.clone(),
        &config.error_log,
        &format!("Role Path: {role_path}"),
    );
    match &outcome {
        Provisioned::Created(path) => crate::success!("Created role {path}"),
        Provisioned::AlreadyExists(path) => crate::warn!("The role {path} already exists"),
        Provisioned::Failed(_) => {}
    }
    Ok(outcome)
}

/// An auth method to attach to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub auth_method: String,
    pub sub_claims: Option<BTreeMap<String, String>>,
}

impl Association {
    #[must_use]
    pub fn new(auth_method: impl Into<String>) -> Self {
        Self {
            auth_method: auth_method.into(),
            sub_claims: None,
        }
    }
}

impl From<&AuthMethodRecord> for Association {
    fn from(record: &AuthMethodRecord) -> Self {
        Self {
            auth_method: record.path.clone(),
            sub_claims: record.sub_claims.clone(),
        }
    }
}

/// Associate each method with the role and return the paths that were
/// attached (or already were).
///
/// A missing method is reported and skipped; other failures are reported
/// and the rest still proceed.
pub async fn associate_auth_methods(
    config: &ProvisionConfig,
    role_path: &str,
    methods: &[Association],
) -> Vec<String> {
    let mut associated = Vec::with_capacity(methods.len());
    for method in methods {
        let body = AssocRoleAuthMethod {
            role_name: role_path.to_string(),
            am_name: method.auth_method.clone(),
            sub_claims: method.sub_claims.clone(),
            token: config.auth_token.clone(),
        };

        match config.api.assoc_role_auth_method(&body).await {
            Ok(()) => associated.push(method.auth_method.clone()),
            Err(e) if e.is_conflict() => associated.push(method.auth_method.clone()),
            Err(e) if e.is_not_found() => crate::warn!(
                "Auth Method {} not found. Please confirm path and try again. \
                 Previous additions to the role persist and do not need to be repeated.",
                method.auth_method
            ),
            Err(e) => crate::error!(
                "Could not attach {} to {role_path}: {e}",
                method.auth_method
            ),
        }
    }
    associated
}

/// Ask which existing auth methods to attach. The shared OIDC method also
/// asks for the AD groups to put in its sub-claims.
pub fn prompt_auth_methods(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    role_path: &str,
) -> Result<Vec<Association>> {
    let paths = prompter.list(&format!(
        "Type the Auth Method paths to attach to the Access Role '{role_path}' (comma separated):"
    ))?;

    let mut methods = Vec::with_capacity(paths.len());
    for path in paths {
        let mut association = Association::new(path);
        if association.auth_method == config.oidc_auth_method {
            let groups =
                prompter.list("Type the AD group names for the Sub Claims (comma separated):")?;
            association.sub_claims = Some(groups_sub_claims(&groups));
        }
        methods.push(association);
    }
    Ok(methods)
}

/// Deny rules, allow rules, then auth method associations.
pub async fn set_auth_rules(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    role_path: &str,
    app: Option<&AppInfo>,
    methods: Option<&[Association]>,
) -> Result<Vec<String>> {
    let mut deny = default_deny_rules();
    if app.is_none() {
        prompt_deny_rules(prompter, &mut deny)?;
    }
    apply_rules(config, role_path, &deny).await?;

    let allow = match app {
        Some(app) => allow_rules_for(app),
        None => prompt_allow_rules(prompter)?,
    };
    apply_rules(config, role_path, &allow).await?;

    let prompted;
    let methods = match methods {
        Some(methods) => methods,
        None => {
            prompted = prompt_auth_methods(config, prompter, role_path)?;
            &prompted
        }
    };
    Ok(associate_auth_methods(config, role_path, methods).await)
}

/// Role outcome plus the auth methods attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSetup {
    pub role: Provisioned<String>,
    pub associated: Vec<String>,
}

/// Create (or reuse) the role and apply its rules and associations.
pub async fn choose_role_option(
    config: &ProvisionConfig,
    prompter: &mut Prompter,
    app: Option<&AppInfo>,
    methods: Option<&[Association]>,
) -> Result<RoleSetup> {
    let role = create_role(config, prompter, app).await?;
    let associated = match role.value() {
        Some(role_path) => set_auth_rules(config, prompter, role_path, app, methods).await?,
        None => Vec::new(),
    };
    Ok(RoleSetup { role, associated })
}
