use clap::Parser;
use mimalloc::MiMalloc;
use telemetry_bridge::{app, cli::Args, logging};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before parsing so it can supply option values
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _log_guard = logging::init_logging(args.log_dir.as_deref())?;

    app::run(args).await?;

    Ok(())
}
