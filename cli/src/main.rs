//! hanger - command-line access to namespaced credentials
//!
//! Reads `<config dir>/keychain-hanger/config.json` (or `--config`) and runs a
//! single gateway operation. Results are printed to stdout as JSON; logs go
//! to stderr and follow `RUST_LOG`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use keychain_hanger::{
    CredentialChanges, CredentialQuery, CredentialRecord, CredentialType, HangerConfig,
    MatchLimit, Status,
};
use serde::{Serialize, Serializer};
use zeroize::Zeroizing;

#[derive(Debug, Parser)]
#[command(name = "hanger", version, about = "Namespaced credentials in the OS keychain")]
struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Application prefix, overriding the configured one
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a new credential
    Save {
        #[arg(long)]
        password: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        application: Option<String>,
    },
    /// List matching credentials
    Query {
        #[command(flatten)]
        filter: FilterArgs,
        /// Maximum number of records (defaults to the configured limit)
        #[arg(long)]
        limit: Option<usize>,
        /// Include passwords in the output
        #[arg(long)]
        show_password: bool,
    },
    /// Change fields of matching credentials
    Update {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        new_username: Option<String>,
        #[arg(long)]
        new_password: Option<String>,
        #[arg(long)]
        new_application: Option<String>,
    },
    /// Remove matching credentials
    Delete {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Only records with this username
    #[arg(long)]
    username: Option<String>,
    /// Only records for this application
    #[arg(long)]
    application: Option<String>,
}

impl From<FilterArgs> for CredentialQuery {
    fn from(args: FilterArgs) -> Self {
        CredentialQuery::new(args.username, args.application)
    }
}

/// JSON shape of a record on stdout.
#[derive(Debug, Serialize)]
struct RecordView {
    kind: CredentialType,
    username: Option<String>,
    application: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secret"
    )]
    password: Option<Zeroizing<String>>,
}

fn serialize_secret<S: Serializer>(
    secret: &Option<Zeroizing<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    secret.as_deref().map(String::as_str).serialize(serializer)
}

impl RecordView {
    fn new(record: &CredentialRecord, show_password: bool) -> Self {
        Self {
            kind: record.kind(),
            username: record.username().map(str::to_string),
            application: record.application().map(str::to_string),
            password: if show_password {
                record.password().map(Zeroizing::new)
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Outcome<T> {
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
}

/// Initialize structured logging with tracing
fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print<T: Serialize>(outcome: &Outcome<T>) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("failed to encode output")?;
    println!("{json}");
    Ok(())
}

fn check(status: Status, operation: &str) -> Result<()> {
    if !status.is_success() {
        bail!("{operation} failed: {status}");
    }
    Ok(())
}

/// The binary only talks to stores that keep credentials after it exits.
fn ensure_persistent(config: &HangerConfig) -> Result<()> {
    if !config.backend.is_persistent() {
        bail!("the memory backend does not outlive a single command; configure the keyring backend");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = HangerConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(prefix) = cli.prefix {
        config.prefix = prefix;
    }
    config.validate()?;
    ensure_persistent(&config)?;

    let gateway = config.gateway();
    let kind = CredentialType::InternetPassword;
    tracing::debug!(prefix = gateway.prefix(), "Gateway ready");

    match cli.command {
        Command::Save {
            password,
            username,
            application,
        } => {
            let password = Zeroizing::new(password);
            let result = gateway.save(&password, username.as_deref(), application.as_deref(), kind);
            print(&Outcome {
                status: result.status,
                result: result.item.as_ref().map(|r| RecordView::new(r, false)),
            })?;
            check(result.status, "save")
        }
        Command::Query {
            filter,
            limit,
            show_password,
        } => {
            let limit = MatchLimit::Count(limit.unwrap_or(config.default_limit));
            let result = gateway.query(&filter.into(), limit, kind);
            let records = result.item.as_ref().map(|records| {
                records
                    .iter()
                    .map(|r| RecordView::new(r, show_password))
                    .collect::<Vec<_>>()
            });
            // Nothing found is an empty answer, not a failure.
            let status = result.status;
            print(&Outcome {
                status,
                result: Some(records.unwrap_or_default()),
            })?;
            if status == Status::ITEM_NOT_FOUND {
                return Ok(());
            }
            check(status, "query")
        }
        Command::Update {
            filter,
            new_username,
            new_password,
            new_application,
        } => {
            let changes = CredentialChanges {
                username: new_username,
                password: new_password.map(Zeroizing::new),
                application: new_application,
            };
            if changes.is_empty() {
                bail!("update needs at least one of --new-username, --new-password, --new-application");
            }
            let status = gateway.update(&filter.into(), &changes, kind);
            print::<()>(&Outcome {
                status,
                result: None,
            })?;
            check(status, "update")
        }
        Command::Delete { filter } => {
            let status = gateway.delete_reporting(&filter.into(), kind);
            print::<()>(&Outcome {
                status,
                result: None,
            })?;
            if status == Status::ITEM_NOT_FOUND {
                tracing::info!("No matching credentials");
                return Ok(());
            }
            check(status, "delete")
        }
    }
}
