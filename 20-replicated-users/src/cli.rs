use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_PORT: u16 = 9000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the users API from one process. Replicates through a supervisor
    /// when `--supervisor` is given, otherwise runs standalone.
    Worker(WorkerArgs),
    /// Spawn workers, relay their snapshots and balance HTTP traffic across them.
    Supervisor(SupervisorArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
    /// Interface the HTTP server binds to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// HTTP port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address of the supervisor relay.
    #[arg(long)]
    pub supervisor: Option<SocketAddr>,
}

impl WorkerArgs {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SupervisorArgs {
    /// Interface for the load balancer and the workers.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Public load balancer port. Workers take the ports right after it.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of worker processes. Defaults to available parallelism minus one.
    #[arg(long)]
    pub workers: Option<NonZeroUsize>,

    /// Socket address of the replication relay. Use 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:0")]
    pub relay: SocketAddr,
}

impl SupervisorArgs {
    pub fn worker_count(&self) -> usize {
        self.workers.map(NonZeroUsize::get).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|cores| cores.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Addresses of workers `1..=worker_count()`, i.e. `port + 1` onwards.
    pub fn worker_addrs(&self) -> Option<Vec<SocketAddr>> {
        (1..=self.worker_count())
            .map(|index| {
                let offset = u16::try_from(index).ok()?;
                let port = self.port.checked_add(offset)?;
                Some(SocketAddr::new(self.host, port))
            })
            .collect()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_defaults_to_standalone() {
        let cli = Cli::try_parse_from(["replicated-users", "worker", "--port", "4100"])
            .expect("parse worker");
        let Command::Worker(args) = cli.command else {
            panic!("expected worker command");
        };
        assert_eq!(args.port, 4100);
        assert_eq!(args.supervisor, None);
        assert_eq!(args.listen_addr(), SocketAddr::from(([127, 0, 0, 1], 4100)));
    }

    #[test]
    fn supervisor_places_workers_after_its_port() {
        let cli = Cli::try_parse_from([
            "replicated-users",
            "supervisor",
            "--port",
            "4000",
            "--workers",
            "3",
        ])
        .expect("parse supervisor");
        let Command::Supervisor(args) = cli.command else {
            panic!("expected supervisor command");
        };

        let ports: Vec<u16> = args
            .worker_addrs()
            .expect("ports fit")
            .iter()
            .map(SocketAddr::port)
            .collect();
        assert_eq!(ports, vec![4001, 4002, 4003]);
    }

    #[test]
    fn worker_ports_must_fit() {
        let cli = Cli::try_parse_from([
            "replicated-users",
            "supervisor",
            "--port",
            "65535",
            "--workers",
            "1",
        ])
        .expect("parse supervisor");
        let Command::Supervisor(args) = cli.command else {
            panic!("expected supervisor command");
        };
        assert!(args.worker_addrs().is_none());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = Cli::try_parse_from(["replicated-users", "supervisor", "--workers", "0"]);
        assert!(result.is_err());
    }
}
