//! Supervisor process: relay, worker children and the public load balancer.
//!
//! Workers are spawned as child processes of the current executable with the
//! `worker` subcommand, each pointed at the relay. Children are killed when the
//! supervisor shuts down; a worker that exits on its own is logged and not
//! restarted.

use std::net::SocketAddr;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use tokio::{
    net::TcpListener,
    process::{Child, Command},
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::balancer::{self, Balancer};
use crate::cli::SupervisorArgs;
use crate::http;
use crate::relay::Relay;
use crate::worker::ctrl_c;

pub async fn run(args: SupervisorArgs) -> Result<()> {
    let worker_addrs = args.worker_addrs().ok_or_else(|| {
        anyhow!(
            "{} workers do not fit above port {}",
            args.worker_count(),
            args.port
        )
    })?;

    let relay_listener = TcpListener::bind(args.relay)
        .await
        .with_context(|| format!("failed to bind relay on {}", args.relay))?;
    let relay = Relay::new(relay_listener);
    let relay_addr = relay.local_addr()?;
    info!(%relay_addr, "relay listening");

    let (relay_shutdown_tx, relay_shutdown_rx) = oneshot::channel::<()>();
    let relay_task = tokio::spawn(relay.run_until(async move {
        let _ = relay_shutdown_rx.await;
    }));

    let program = std::env::current_exe().context("failed to locate worker executable")?;
    let mut monitors = Vec::with_capacity(worker_addrs.len());
    for addr in &worker_addrs {
        let child = spawn_worker(&program, *addr, relay_addr)?;
        monitors.push(monitor_worker(child, *addr));
    }

    let listener = TcpListener::bind(args.listen_addr())
        .await
        .with_context(|| format!("failed to bind load balancer on {}", args.listen_addr()))?;
    info!(
        addr = %listener.local_addr()?,
        workers = worker_addrs.len(),
        "load balancer listening"
    );

    let app = balancer::app(Balancer::new(worker_addrs)?);
    let result = http::serve(listener, app, ctrl_c()).await;

    info!("supervisor shutting down");
    for monitor in &monitors {
        // Dropping the monitored child kills the process.
        monitor.abort();
    }
    let _ = relay_shutdown_tx.send(());
    if let Err(err) = relay_task.await {
        warn!(error = ?err, "relay task failed");
    }

    result
}

fn spawn_worker(
    program: &std::path::Path,
    addr: SocketAddr,
    relay: SocketAddr,
) -> Result<Child> {
    let child = Command::new(program)
        .arg("worker")
        .arg("--host")
        .arg(addr.ip().to_string())
        .arg("--port")
        .arg(addr.port().to_string())
        .arg("--supervisor")
        .arg(relay.to_string())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn worker for {addr}"))?;

    info!(%addr, pid = child.id(), "worker spawned");
    Ok(child)
}

fn monitor_worker(mut child: Child, addr: SocketAddr) -> JoinHandle<()> {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => warn!(%addr, %status, "worker exited"),
            Err(err) => warn!(%addr, error = ?err, "failed to wait for worker"),
        }
    })
}
