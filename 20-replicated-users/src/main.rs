use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::warn;

use replicated_users::{
    cli::{Cli, Command},
    supervisor,
    worker::Worker,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Worker(args) => {
            let addr = args.listen_addr();
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind worker on {addr}"))?;
            let worker = Worker::start(listener, args.supervisor).await?;
            if let Err(err) = worker.run_until_ctrl_c().await {
                warn!("worker exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Supervisor(args) => supervisor::run(args).await?,
    }

    Ok(())
}
