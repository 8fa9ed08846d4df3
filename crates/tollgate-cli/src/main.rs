//! Tollgate CLI - inspect and edit the permission policy
//!
//! Usage:
//!   tollgate check send_email --details '{"to": "a@x.com"}'
//!   tollgate check run_application --ceiling 1 \
//!       --details '{"application": "Notes"}' --details '{"application": "Mail"}'
//!   tollgate whitelist add boss@example.com
//!   tollgate blacklist remove old@example.com
//!   tollgate config show

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tollgate::{GateError, Gatekeeper, JsonFileBackend, ListChange, PolicyStore, RateCeilings};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code when the policy denies any of the actions.
const EXIT_DENIED: u8 = 2;
/// Exit code when the daily ceiling is exhausted; later requests are not checked.
const EXIT_RATE_LIMITED: u8 = 3;

/// Tollgate - permission gatekeeper for desktop automation
#[derive(Parser, Debug)]
#[command(name = "tollgate", version)]
#[command(about = "Inspect and edit the tollgate permission policy")]
struct Args {
    /// Policy file (defaults to ~/.tollgate/policy.json)
    #[arg(long, env = "TOLLGATE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask whether an action would be permitted
    ///
    /// Each --details is checked in order within one session, so earlier
    /// requests count toward the daily ceiling and recipient history.
    Check {
        /// Action kind (send_email, file_operation, run_application, execute_script, ...)
        kind: String,
        /// Request details as a JSON object (repeatable)
        #[arg(long, default_value = "{}")]
        details: Vec<String>,
        /// Daily ceiling for this kind instead of the built-in one
        #[arg(long)]
        ceiling: Option<u32>,
    },
    /// Edit the recipient whitelist
    Whitelist {
        #[command(subcommand)]
        change: ListCommand,
    },
    /// Edit the recipient blacklist
    Blacklist {
        #[command(subcommand)]
        change: ListCommand,
    },
    /// Inspect or initialize the policy file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ListCommand {
    /// Add an entry
    Add {
        /// The identifier (usually an email address)
        item: String,
    },
    /// Remove an entry
    Remove {
        /// The identifier (usually an email address)
        item: String,
    },
}

impl ListCommand {
    fn into_parts(self) -> (String, ListChange) {
        match self {
            ListCommand::Add { item } => (item, ListChange::Add),
            ListCommand::Remove { item } => (item, ListChange::Remove),
        }
    }
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective policy
    Show,
    /// Print the policy file location
    Path,
    /// Write the effective policy to disk
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();
    let backend = match args.config {
        Some(path) => JsonFileBackend::new(path),
        None => JsonFileBackend::at_default_location(),
    };
    let path = backend.path().to_path_buf();

    if let Command::Config {
        action: ConfigCommand::Path,
    } = args.command
    {
        println!("{}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let store = PolicyStore::load(backend).await;

    match args.command {
        Command::Check {
            kind,
            details,
            ceiling,
        } => {
            let requests = details
                .iter()
                .map(|d| serde_json::from_str::<serde_json::Value>(d))
                .collect::<Result<Vec<_>, _>>()
                .context("--details must be valid JSON")?;

            let mut ceilings = RateCeilings::default();
            if let Some(limit) = ceiling {
                ceilings = ceilings.with_limit(kind.as_str(), limit);
            }
            let gate = Gatekeeper::builder(store).ceilings(ceilings).build();

            let mut denied = false;
            for request in requests {
                match gate.check_permission(kind.as_str(), request) {
                    Ok(decision) => {
                        println!("{}", serde_json::to_string_pretty(&decision.to_record())?);
                        denied |= !decision.is_allowed();
                    }
                    Err(e @ GateError::RateLimitExceeded { .. }) => {
                        eprintln!("tollgate: {e}");
                        return Ok(ExitCode::from(EXIT_RATE_LIMITED));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if denied {
                Ok(ExitCode::from(EXIT_DENIED))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Whitelist { change } => {
            let (item, change) = change.into_parts();
            let changed = store
                .mutate_whitelist(&item, change)
                .await
                .with_context(|| format!("failed to save {}", path.display()))?;
            report_list_change("whitelist", &item, change, changed);
            Ok(ExitCode::SUCCESS)
        }
        Command::Blacklist { change } => {
            let (item, change) = change.into_parts();
            let changed = store
                .mutate_blacklist(&item, change)
                .await
                .with_context(|| format!("failed to save {}", path.display()))?;
            report_list_change("blacklist", &item, change, changed);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            match action {
                ConfigCommand::Show => {
                    print!("{}", store.snapshot().to_json()?);
                }
                ConfigCommand::Init => {
                    store
                        .save()
                        .await
                        .with_context(|| format!("failed to save {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                ConfigCommand::Path => println!("{}", path.display()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report_list_change(list: &str, item: &str, change: ListChange, changed: bool) {
    match (change, changed) {
        (ListChange::Add, true) => println!("added {item} to {list}"),
        (ListChange::Add, false) => println!("{item} already in {list}"),
        (ListChange::Remove, true) => println!("removed {item} from {list}"),
        (ListChange::Remove, false) => println!("{item} not in {list}"),
    }
}
