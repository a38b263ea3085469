//! Rainfall Retriever - precipitation-frequency estimates over HTTP or from the shell

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use rainfall_retriever::export::{table_to_csv, table_to_text};
use rainfall_retriever::server::{start_server, ServerState};
use rainfall_retriever::{
    build_orchestrator, Config, InputMode, Phase, StartupError, SubmitOutcome, TableKind,
};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rainfall-retriever", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single retrieval and print the tables
    Lookup(LookupArgs),
}

#[derive(Args)]
struct LookupArgs {
    #[arg(long, allow_hyphen_values = true, requires = "lon", required_unless_present = "address")]
    lat: Option<String>,
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<String>,
    /// U.S. address to geocode instead of coordinates
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    address: Option<String>,
    /// Print one table as CSV (intensity or depth)
    #[arg(long)]
    csv: Option<TableKind>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, StartupError> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("rainfall_retriever=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if config.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            serve(config, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Lookup(args) => Ok(lookup(&config, args).await),
    }
}

async fn serve(config: Config, port: Option<u16>) -> Result<(), StartupError> {
    let port = port.unwrap_or(config.port);
    info!("Starting Rainfall Retriever...");
    info!("Port: {}", port);

    let orchestrator = Arc::new(build_orchestrator(&config));
    let state = Arc::new(ServerState::new(orchestrator));
    start_server(state, port, config.cors_layer()).await?;
    Ok(())
}

async fn lookup(config: &Config, args: LookupArgs) -> ExitCode {
    let orchestrator = build_orchestrator(config);
    match (&args.address, &args.lat, &args.lon) {
        (Some(address), _, _) => {
            orchestrator.set_mode(InputMode::Address);
            orchestrator.set_address(address);
        }
        (None, Some(lat), Some(lon)) => {
            orchestrator.set_latitude(lat);
            orchestrator.set_longitude(lon);
        }
        _ => {}
    }

    match orchestrator.submit().await {
        SubmitOutcome::Completed(Phase::Success(dataset)) => {
            let form = orchestrator.snapshot().form;
            match args.csv {
                Some(kind) => println!("{}", table_to_csv(dataset.table(kind))),
                None => {
                    println!("Location: {}, {}\n", form.latitude, form.longitude);
                    println!("{}\n", table_to_text(dataset.intensity()));
                    println!("{}", table_to_text(dataset.depth()));
                }
            }
            ExitCode::SUCCESS
        }
        SubmitOutcome::Completed(Phase::Failed(failure)) => {
            warn!(kind = %failure.kind, detail = %failure.message, "Lookup failed");
            eprintln!("Error: {}", failure.user_message());
            ExitCode::FAILURE
        }
        other => {
            warn!(outcome = ?other, "Lookup did not complete");
            ExitCode::FAILURE
        }
    }
}
