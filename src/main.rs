mod bridge;
mod engine;
mod io;
mod logging;
mod server;

use clap::Parser;
use engine::protocol::EngineClient;
use io::{ChildProcessManager, ProcessExitEvent, ProcessExitHandler, ProcessManager, StderrMonitor};
use logging::{LogConfig, init_logging};
use server::Backend;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{stdin, stdout};
use tower_lsp::{LspService, Server};
use tracing::{error, info, warn};

/// CLI arguments for the bridge server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the analysis engine executable (overrides TSBRIDGE_ENGINE env var)
    #[arg(long, value_name = "PATH")]
    engine: Option<String>,

    /// Extra arguments passed to the engine executable
    #[arg(long = "engine-arg", value_name = "ARG")]
    engine_args: Vec<String>,

    /// Working directory for the engine process
    #[arg(long, value_name = "DIR")]
    engine_cwd: Option<PathBuf>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides TSBRIDGE_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// Resolve the engine path from CLI args and environment
fn resolve_engine_path(engine_arg: Option<String>) -> String {
    // Priority: CLI arg > TSBRIDGE_ENGINE env var > "tsengine" default
    engine_arg
        .or_else(|| std::env::var("TSBRIDGE_ENGINE").ok())
        .unwrap_or_else(|| "tsengine".to_string())
}

/// Logs engine exits; the correlator independently rejects pending commands
/// when the transport reaches end-of-stream
struct ExitLogger;

#[async_trait::async_trait]
impl ProcessExitHandler for ExitLogger {
    async fn on_process_exit(&self, _event: ProcessExitEvent) {
        error!("Analysis engine process exited; in-flight requests will fail");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging with configuration from env vars and CLI args
    let log_config = LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let engine_path = resolve_engine_path(args.engine);
    info!("Using analysis engine: {}", engine_path);

    let mut process = ChildProcessManager::new(engine_path, args.engine_args, args.engine_cwd);
    process.on_process_exit(Arc::new(ExitLogger));
    process.on_stderr_line(|line| {
        warn!("engine stderr: {}", line);
    });

    if let Err(e) = process.start().await {
        eprintln!("Failed to start analysis engine: {e}");
        std::process::exit(1);
    }
    let transport = process.create_stdio_transport()?;

    let engine_client = Arc::new(EngineClient::new(transport));

    info!("Bridge ready and listening for editor requests");

    let (service, socket) = LspService::build(|client| Backend::new(client, engine_client)).finish();
    Server::new(stdin(), stdout(), socket).serve(service).await;

    info!("Editor connection closed, stopping engine");
    if let Err(e) = process.stop(io::StopMode::Graceful).await {
        warn!("Failed to stop engine cleanly: {}", e);
    }

    Ok(())
}
