//! Hygiene gateway: rate-limited HTTP front door for AI hygiene analysis

use clap::{Parser, Subcommand};
use hygiene_gateway::{
    cli::ServerArgs,
    config::settings::DEFAULT_CONFIG_PATH,
    init_logger_with_config, log_error, log_info,
    runtime::run_with_runtime,
    GatewayConfig,
};
use tracing::error;

#[derive(Parser)]
#[command(name = "hygiene-gateway")]
#[command(about = "Rate-limited gateway for AI-assisted hygiene inspections")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    #[command(name = "server")]
    Server(ServerArgs),

    /// Print the effective configuration as YAML
    #[command(name = "config")]
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match GatewayConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if cli.verbose {
        config.log_level = "debug".to_string();
    } else if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Some(Commands::Server(args)) => serve(args, config),
        None => serve(ServerArgs::default(), config),
    }
}

fn serve(args: ServerArgs, config: GatewayConfig) -> anyhow::Result<()> {
    init_logger_with_config(
        &config.log_level,
        config.logging.enable_file_logging,
        &config.logging.log_dir,
    );

    log_info!("📋 Version: {}", env!("CARGO_PKG_VERSION"));

    let runtime_config = config.runtime.clone();
    run_with_runtime(&runtime_config, async move {
        if let Err(e) = args.start_server(config).await {
            log_error!("Server error: {}", e);
            error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
        Ok(())
    })
}
