//! `lcac` CLI entry point.
//!
//! A thin developer and demo front end over [`lcac::service::LcacService`]:
//! initialise the database, manage memories and sessions, run inference
//! requests, and inspect the audit trail and trust scores. Every command
//! prints pretty JSON on stdout.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use lcac::config::Config;
use lcac::kernel::session::Metadata;
use lcac::providers::router::build_provider;
use lcac::service::LcacService;

/// Least-Context Access Control for clinical agent memory.
#[derive(Parser)]
#[command(name = "lcac", version, about)]
struct Cli {
    /// Database file (overrides config and `LCAC_DATABASE_PATH`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Write JSON logs to this directory in addition to stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Create the database and apply the schema.
    Init {
        /// Also insert the sample clinical memories.
        #[arg(long)]
        seed: bool,
    },
    /// Manage memories.
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Manage sessions.
    #[command(subcommand)]
    Session(SessionCommand),
    /// Run an inference request in a session.
    Ask {
        /// Session id.
        session_id: String,
        /// User message.
        message: String,
        /// Model timeout in seconds (default from config).
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Inspect the audit trail.
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Inspect or reset trust scores.
    #[command(subcommand)]
    Trust(TrustCommand),
}

/// Memory subcommands.
#[derive(Subcommand)]
enum MemoryCommand {
    /// Store a new memory.
    Add {
        /// Zone the memory belongs to.
        #[arg(long)]
        zone: String,
        /// Content tag (repeatable).
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,
        /// Content text.
        #[arg(long)]
        content: String,
    },
    /// List memories, optionally as seen from a zone.
    List {
        /// Zone to filter through the access policy.
        #[arg(long)]
        zone: Option<String>,
    },
    /// Redact a memory.
    Redact {
        /// Memory id.
        memory_id: String,
        /// Reason, recorded in the log.
        #[arg(long)]
        reason: Option<String>,
    },
}

/// Session subcommands.
#[derive(Subcommand)]
enum SessionCommand {
    /// Open a session.
    Create {
        /// Zone the session is bound to.
        #[arg(long)]
        zone: String,
        /// User the session is bound to.
        #[arg(long)]
        user: String,
        /// Metadata entry as `key=value` (repeatable; JSON values accepted).
        #[arg(long = "meta")]
        meta: Vec<String>,
    },
    /// Show a session.
    Show {
        /// Session id.
        session_id: String,
    },
    /// Revoke a session.
    Revoke {
        /// Session id.
        session_id: String,
        /// Revocation reason.
        #[arg(long)]
        reason: Option<String>,
    },
}

/// Audit subcommands.
#[derive(Subcommand)]
enum AuditCommand {
    /// List records, newest first.
    List {
        /// Only records for this session.
        #[arg(long)]
        session: Option<String>,
    },
    /// Recompute a record's provenance hash.
    Verify {
        /// Audit record id.
        audit_id: String,
    },
}

/// Trust subcommands.
#[derive(Subcommand)]
enum TrustCommand {
    /// Show a user's score.
    Show {
        /// User id.
        user: String,
    },
    /// Restore a user's initial score.
    Reset {
        /// User id.
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _logging_guard = match &cli.log_dir {
        Some(dir) => Some(lcac::logging::init_production(dir)?),
        None => {
            lcac::logging::init_cli();
            None
        }
    };

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(path) = cli.db {
        config.database.path = Some(path);
    }
    config.validate().context("invalid configuration")?;

    let db_path = config.database_path()?;
    let pool = lcac::db::open(&db_path)
        .await
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    let provider = build_provider(&config.model, |key| std::env::var(key).ok())
        .context("failed to configure model provider")?;
    let service = LcacService::new(pool, &config, provider);

    match cli.command {
        Command::Init { seed } => {
            let created = if seed {
                lcac::seed::seed(service.memory_store()).await?
            } else {
                Vec::new()
            };
            info!(path = %db_path.display(), "database initialised");
            print_json(&serde_json::json!({
                "database": db_path.display().to_string(),
                "seeded": created,
            }))
        }
        Command::Memory(cmd) => run_memory(&service, cmd).await,
        Command::Session(cmd) => run_session(&service, cmd).await,
        Command::Ask {
            session_id,
            message,
            timeout_secs,
        } => {
            let timeout = timeout_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| service.timeout());
            let outcome = service
                .ask_with_timeout(&session_id, &message, timeout)
                .await?;
            print_json(&outcome)?;
            outcome.ensure_compliant()?;
            Ok(())
        }
        Command::Audit(AuditCommand::List { session }) => {
            print_json(&service.audit_trail(session.as_deref()).await?)
        }
        Command::Audit(AuditCommand::Verify { audit_id }) => {
            print_json(&service.verify_audit(&audit_id).await?)
        }
        Command::Trust(TrustCommand::Show { user }) => {
            print_json(&service.trust_score(&user).await?)
        }
        Command::Trust(TrustCommand::Reset { user }) => {
            print_json(&service.reset_trust(&user).await?)
        }
    }
}

async fn run_memory(service: &LcacService, cmd: MemoryCommand) -> anyhow::Result<()> {
    match cmd {
        MemoryCommand::Add {
            zone,
            tags,
            content,
        } => print_json(&service.create_memory(&zone, &tags, &content).await?),
        MemoryCommand::List { zone } => print_json(&service.list_memories(zone.as_deref()).await?),
        MemoryCommand::Redact { memory_id, reason } => {
            print_json(&service.redact_memory(&memory_id, reason.as_deref()).await?)
        }
    }
}

async fn run_session(service: &LcacService, cmd: SessionCommand) -> anyhow::Result<()> {
    match cmd {
        SessionCommand::Create { zone, user, meta } => {
            let metadata = parse_metadata(&meta)?;
            print_json(&service.create_session(&zone, &user, metadata).await?)
        }
        SessionCommand::Show { session_id } => print_json(&service.get_session(&session_id).await?),
        SessionCommand::Revoke { session_id, reason } => {
            print_json(&service.revoke_session(&session_id, reason.as_deref()).await?)
        }
    }
}

/// Parse `key=value` pairs; values that parse as JSON keep their type.
fn parse_metadata(entries: &[String]) -> anyhow::Result<Metadata> {
    let mut metadata = Metadata::new();
    for entry in entries {
        let (key, raw) = entry
            .split_once('=')
            .with_context(|| format!("metadata entry {entry:?} is not key=value"))?;
        let key = key.trim();
        anyhow::ensure!(!key.is_empty(), "metadata entry {entry:?} has an empty key");
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
        metadata.insert(key.to_owned(), value);
    }
    Ok(metadata)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
