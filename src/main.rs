use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let _log_guard = school_desk::logging::init_logging(args.verbose);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "school-desk starting");
    cli::run(args).await
}
