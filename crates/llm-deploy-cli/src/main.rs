//! llm-deploy - provision a local LLM inference service.
//!
//! This binary is copied onto a target host and run there. It speaks the
//! line-delimited JSON event protocol on stdout; stderr carries operator
//! diagnostics only and is not part of the wire contract.

use clap::Parser;
use llm_deploy_core::{
    CancellationToken, DeployConfig, EventEmitter, Orchestrator, ShellExecutor,
    DEFAULT_CONFIG_PATH,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "llm-deploy")]
#[command(about = "Deploy a local LLM inference service")]
struct Args {
    /// Deployment configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Diagnostics go to stderr; stdout is reserved for the event protocol.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Starting llm-deploy (config: {})", args.config.display());

    let emitter = Arc::new(EventEmitter::stdout());
    let config = DeployConfig::resolve(&args.config, &emitter);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling deployment");
                cancel.cancel();
            }
        });
    }

    let executor = Arc::new(ShellExecutor::new(cancel));
    let code = Orchestrator::new(config, emitter, executor).run().await;

    std::process::exit(code);
}
