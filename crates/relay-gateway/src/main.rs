use std::path::PathBuf;

use clap::Parser;
use relay_core::tracing_setup::init_tracing_with_service;
use relay_core::RelayConfig;
use relay_gateway::gateway::run_gateway;

#[derive(Parser)]
#[command(name = "relay-gateway")]
#[command(about = "Slack conversational relay")]
struct Cli {
    /// Path to JSON config file (defaults to ~/.chatrelay/config.json when present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to listen on, overrides bindAddr
    #[arg(long, short = 'b')]
    bind: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing_with_service("relay-gateway");

    let mut config = load_config(&cli);
    config.apply_env();
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_gateway(config) {
        eprintln!("Gateway error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration from --config, the default location, or built-in defaults
fn load_config(cli: &Cli) -> RelayConfig {
    if let Some(ref path) = cli.config {
        match RelayConfig::load(path) {
            Ok(config) => return config,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    let default_path = RelayConfig::default_path();
    if default_path.exists() {
        match RelayConfig::load(&default_path) {
            Ok(config) => return config,
            Err(e) => {
                eprintln!("Warning: {:#}, using defaults", e);
            }
        }
    }

    RelayConfig::default()
}
