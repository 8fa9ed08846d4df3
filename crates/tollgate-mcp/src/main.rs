//! Tollgate MCP Server
//!
//! Runs the permission gatekeeper as an MCP server over stdio. The audit
//! trail lives in memory for the life of the process; pass `--audit-file`
//! to keep a JSON Lines copy when the session ends.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::ServiceExt;
use tollgate::{AuditLog, Gatekeeper, JsonFileBackend, PolicyStore};
use tollgate_mcp::TollgateServer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tollgate MCP server
#[derive(Parser, Debug)]
#[command(name = "tollgate-mcp", version)]
#[command(about = "Serve tollgate permission checks over MCP stdio")]
struct Args {
    /// Policy file (defaults to ~/.tollgate/policy.json)
    #[arg(long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Write the audit trail here as JSON Lines on shutdown
    #[arg(long)]
    audit_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let backend = match args.config {
        Some(path) => JsonFileBackend::new(path),
        None => JsonFileBackend::at_default_location(),
    };
    tracing::info!(config = %backend.path().display(), "Starting tollgate MCP server");

    let store = PolicyStore::load(backend).await;
    let audit = Arc::new(AuditLog::default());
    let gate = Gatekeeper::builder(store).audit(audit.clone()).build();
    let server = TollgateServer::new(gate);

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("Failed to start MCP service: {}", e);
        })?;

    tracing::info!("Tollgate MCP server running");

    service.waiting().await?;

    if let Some(path) = args.audit_file {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        audit
            .write_jsonl(std::io::BufWriter::new(file))
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "Audit trail written");
    }

    tracing::info!("Tollgate MCP server shutting down");

    Ok(())
}
