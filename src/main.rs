//! Taskhive CLI entry point.
//!
//! Provides `start` to run the kernel, `verify-audit` and `audit-tail` to
//! inspect the audit trail, and `check-config` to validate configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use taskhive::config::{config_dir, TaskhiveConfig};
use taskhive::kernel::audit::AuditLog;
use taskhive::kernel::events::{handler_fn, WILDCARD_TOPIC};
use taskhive::kernel::safety::SafetyValidator;
use taskhive::kernel::Kernel;
use taskhive::logging;
use taskhive::store::open_store;

/// Taskhive: priority task kernel with a tamper-evident audit trail.
#[derive(Parser)]
#[command(name = "taskhive", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the kernel until interrupted.
    Start,
    /// Verify the audit hash chain; exits non-zero if it is broken.
    VerifyAudit,
    /// Print the most recent audit entries as JSON lines.
    AuditTail {
        /// Maximum number of entries to print.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only print entries of this event type.
        #[arg(long)]
        event_type: Option<String>,
    },
    /// Load and validate the configuration, then print it.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = TaskhiveConfig::load().context("failed to load configuration")?;

    match cli.command {
        Command::Start => handle_start(config).await,
        Command::VerifyAudit => handle_verify_audit(config).await,
        Command::AuditTail { limit, event_type } => {
            handle_audit_tail(config, limit, event_type.as_deref()).await
        }
        Command::CheckConfig => handle_check_config(&config),
    }
}

/// Boot the kernel and run until Ctrl-C.
async fn handle_start(config: TaskhiveConfig) -> anyhow::Result<()> {
    let logs_dir = config_dir()?.join("logs");
    let _logging_guard = logging::init_production(&logs_dir, &config.kernel.log_level)?;

    let kernel = Kernel::open(config)
        .await
        .context("failed to initialise kernel")?;

    kernel.events().subscribe(
        WILDCARD_TOPIC,
        handler_fn(|event| async move {
            debug!(topic = %event.topic, source = %event.source, payload = %event.payload, "event");
            Ok(())
        }),
    );

    kernel.start();
    info!(version = env!("CARGO_PKG_VERSION"), "taskhive running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown signal received");
    kernel.shutdown().await;
    Ok(())
}

/// Walk the audit chain and report every integrity error.
async fn handle_verify_audit(config: TaskhiveConfig) -> anyhow::Result<()> {
    logging::init_cli(&config.kernel.log_level);

    let store = open_store(&config.storage)
        .await
        .context("failed to open store")?;
    let audit = AuditLog::open(store, config.audit.scope.clone())
        .await
        .context("failed to open audit log")?;
    let report = audit
        .verify_integrity()
        .await
        .context("failed to read audit log")?;

    for message in report.messages() {
        println!("{message}");
    }
    if !report.ok {
        anyhow::bail!(
            "audit chain is broken: {} error(s) across {} entries",
            report.errors.len(),
            report.entries_checked
        );
    }
    println!("audit chain intact ({} entries)", report.entries_checked);
    Ok(())
}

/// Print recent audit entries.
async fn handle_audit_tail(
    config: TaskhiveConfig,
    limit: usize,
    event_type: Option<&str>,
) -> anyhow::Result<()> {
    logging::init_cli(&config.kernel.log_level);

    let store = open_store(&config.storage)
        .await
        .context("failed to open store")?;
    let audit = AuditLog::open(store, config.audit.scope.clone())
        .await
        .context("failed to open audit log")?;

    for entry in audit.list(event_type, limit).await? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

/// Validate configuration, including that every prohibited pattern compiles.
fn handle_check_config(config: &TaskhiveConfig) -> anyhow::Result<()> {
    logging::init_cli(&config.kernel.log_level);

    let validator =
        SafetyValidator::from_config(&config.safety).context("invalid [safety] section")?;
    println!("{config:#?}");
    println!("configuration ok ({} safety rules)", validator.rules().len());
    Ok(())
}
