use clap::{Parser, Subcommand};

mod commands;
use commands::{
    handle_config_command, handle_endpoints_command, utils::print_error, ConfigCommands,
    EndpointsCommands,
};

#[derive(Parser)]
#[command(name = "fxgate-cli")]
#[command(about = "fxgate CLI - configuration and RPC endpoint tooling for the fxgate gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// RPC Endpoint Diagnostics
    #[command(subcommand)]
    Endpoints(EndpointsCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config(config_command) => handle_config_command(config_command),
        Commands::Endpoints(endpoints_command) => handle_endpoints_command(endpoints_command).await,
    };

    if let Err(e) = &result {
        print_error(&e.to_string());
    }
    result.map_err(Into::into)
}
