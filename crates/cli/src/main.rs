use clap::Parser;
use fleet_dns_domain::CliOverrides;
use mimalloc::MiMalloc;
use tracing::info;

mod bootstrap;
mod di;
mod server;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "fleet-dns")]
#[command(version)]
#[command(about = "Fleet DNS - parallel DNS resolution proxy")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Classic DNS port, shared by UDP and TCP
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let cli_overrides = CliOverrides {
        dns_port: cli.dns_port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level.clone(),
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;

    // Initialize logging
    bootstrap::init_logging(&config);

    info!("Starting Fleet DNS proxy v{}", env!("CARGO_PKG_VERSION"));

    // Dependency Injection - Build the resolution stack
    let services = di::ResolverServices::new(&config).await?;

    // Bind every configured listener and serve until shutdown
    server::run(&config, services.engine).await?;

    info!("Server shutdown complete");
    Ok(())
}
