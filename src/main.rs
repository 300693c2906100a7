use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use secrets_provisioner::config::{
    BootstrapOptions, DEFAULT_ENGINEER_REGISTRY, DEFAULT_ENV_FILE, EngineerRegistry,
    Environment, ProvisionConfig, load_env_file, select_environment,
};
use secrets_provisioner::fetch::uid_token::DEFAULT_TOKEN_FILE;
use secrets_provisioner::fetch::{FetchAuth, FetchOptions, fetch_secret};
use secrets_provisioner::provision::{app, auth_method, menu, role, secret};
use secrets_provisioner::smoke::{SmokeSettings, run_env_check};
use secrets_provisioner::{ProvisionError, Prompter, error, success, warn};

#[derive(Parser)]
#[command(name = "secrets-provisioner")]
#[command(version, about = "Provision rotated secrets, auth methods and access roles")]
struct Cli {
    /// Environment file with credentials and defaults
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Target environment (UAT, PROD, DEV); asked for when not set
    #[arg(long, global = true)]
    env: Option<Environment>,

    /// Testing mode: skip confirmations and offer DEV
    #[arg(long, global = true)]
    testing: bool,

    /// Debug-level diagnostics on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load rotated secrets, one at a time or from a CSV file
    Secret {
        /// Bulk load this CSV file instead of asking
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Create auth methods
    AuthMethod,
    /// Create an access role with its rules and auth methods
    Role,
    /// Onboard an application: secrets, auth methods, then its role
    App,
    /// Choose actions from a menu
    Menu,
    /// Read a rotated secret the way an application would
    Fetch(FetchArgs),
    /// Create, read and delete test secrets against every API URL
    EnvCheck {
        /// API URLs to check (defaults to {ENV}_BASE_URL_LIST)
        #[arg(long, value_delimiter = ',')]
        base_urls: Vec<String>,
    },
}

#[derive(clap::Args)]
struct FetchArgs {
    /// Access id of the auth method (or FETCH_ACCESS_ID)
    #[arg(long)]
    access_id: Option<String>,

    /// Path of the rotated secret (or FETCH_SECRET_PATH)
    #[arg(long)]
    secret: Option<String>,

    /// Authentication type
    #[arg(long, value_enum, default_value = "uid")]
    auth: FetchAuth,

    /// Secrets service URL (or FETCH_BASE_URL)
    #[arg(long)]
    url: Option<String>,

    /// Access key for api-key auth (or FETCH_ACCESS_KEY)
    #[arg(long)]
    access_key: Option<String>,

    /// File holding the UID token
    #[arg(long, default_value = DEFAULT_TOKEN_FILE)]
    token_file: PathBuf,

    /// Rotate the UID token after reading the secret
    #[arg(long)]
    rotate_uid_token: bool,
}

fn env_value(value: Option<String>, name: &str) -> Option<String> {
    value.or_else(|| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    load_env_file(&cli.env_file)
        .with_context(|| format!("Failed to load {}", cli.env_file.display()))?;

    let options = BootstrapOptions {
        env_file: cli.env_file,
        environment: cli.env,
        is_testing: cli.testing,
    };
    let mut prompter = Prompter::stdio();

    let result = match cli.command {
        Command::Fetch(args) => run_fetch(args, &mut prompter).await,
        Command::EnvCheck { base_urls } => run_smoke(&options, base_urls, &mut prompter).await,
        Command::Secret { csv } => {
            provision(Workflow::Secret { csv }, &options, &mut prompter).await
        }
        Command::AuthMethod => provision(Workflow::AuthMethod, &options, &mut prompter).await,
        Command::Role => provision(Workflow::Role, &options, &mut prompter).await,
        Command::App => provision(Workflow::App, &options, &mut prompter).await,
        Command::Menu => provision(Workflow::Menu, &options, &mut prompter).await,
    };

    match result {
        Err(e) if matches!(e.downcast_ref::<ProvisionError>(), Some(ProvisionError::Aborted)) => {
            warn!("Exiting program");
            Ok(())
        }
        other => other,
    }
}

/// Commands that need an authenticated session.
enum Workflow {
    Secret { csv: Option<PathBuf> },
    AuthMethod,
    Role,
    App,
    Menu,
}

async fn provision(
    workflow: Workflow,
    options: &BootstrapOptions,
    prompter: &mut Prompter,
) -> Result<()> {
    let registry_path = env_value(None, "ENGINEER_REGISTRY")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINEER_REGISTRY));
    let registry = EngineerRegistry::load(&registry_path)?;

    let config = ProvisionConfig::bootstrap(options, &registry, prompter).await?;
    success!(
        "Signed in to {} as {} (version {})",
        config.environment,
        config.engineer,
        config.version
    );

    match workflow {
        Workflow::Secret { csv } => {
            let load = match csv {
                Some(path) => secret::load_bulk(&config, prompter, Some(path)).await?,
                None => secret::choose_secret_option(&config, prompter).await?,
            };
            println!("Loaded secrets:");
            for path in &load.paths {
                println!("\t{path}");
            }
        }
        Workflow::AuthMethod => {
            let outcomes = auth_method::choose_auth_methods(&config, prompter, None).await?;
            let failed = outcomes.iter().filter(|(_, o)| o.is_failed()).count();
            if failed > 0 {
                warn!(
                    "{failed} auth method(s) were not created; see {}",
                    config.error_log.path().display()
                );
            }
        }
        Workflow::Role => {
            let setup = role::choose_role_option(&config, prompter, None, None).await?;
            if let Some(path) = setup.role.value() {
                println!("Role: {path}");
                for method in &setup.associated {
                    println!("\tAuth method: {method}");
                }
            }
        }
        Workflow::App => {
            let run = app::create_app_resources(&config, prompter).await?;
            print!("{}", app::render_summary(&run));
        }
        Workflow::Menu => {
            menu::run_menu(&config, prompter).await?;
        }
    }
    Ok(())
}

async fn run_fetch(args: FetchArgs, prompter: &mut Prompter) -> Result<()> {
    let base_url = env_value(args.url, "FETCH_BASE_URL")
        .context("Secrets service URL is not set. Pass --url or set FETCH_BASE_URL.")?;
    let access_id = env_value(args.access_id, "FETCH_ACCESS_ID").unwrap_or_default();
    let secret_path = env_value(args.secret, "FETCH_SECRET_PATH").unwrap_or_default();

    let mut options = FetchOptions::new(&base_url, &access_id, &secret_path, args.auth);
    options.access_key = env_value(args.access_key, "FETCH_ACCESS_KEY");
    options.token_file = args.token_file;
    options.rotate_uid_token = args.rotate_uid_token;

    let value = fetch_secret(&options, prompter).await?;
    let rendered = match value.get("value") {
        Some(inner) => serde_json::to_string_pretty(inner)?,
        None => serde_json::to_string_pretty(&value)?,
    };
    println!("{rendered}");
    Ok(())
}

async fn run_smoke(
    options: &BootstrapOptions,
    base_urls: Vec<String>,
    prompter: &mut Prompter,
) -> Result<()> {
    let environment = select_environment(options.environment, prompter, options.is_testing)?;
    let settings = SmokeSettings::from_env(environment, base_urls)?;

    let report = run_env_check(&settings).await;
    if !report.passed() {
        for failure in report.failures() {
            error!(
                "{} {}: {}",
                failure.url,
                failure.step,
                failure.error.as_deref().unwrap_or_default()
            );
        }
        anyhow::bail!("Environment check failed for {}", settings.environment);
    }
    Ok(())
}
