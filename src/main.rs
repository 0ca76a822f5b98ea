//! NebulaForge CLI for multi-cloud infrastructure synthesis.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "nebulaforge",
    version,
    about = "Compile one declarative workload into Terraform modules and a Crossplane composition"
)]
struct Cli {
    /// Log debug diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: nebulaforge::cli::Commands,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("nebulaforge=debug")
    } else {
        EnvFilter::try_from_env("NEBULAFORGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = nebulaforge::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
