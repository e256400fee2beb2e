//! Command-line argument parsing

use std::net::IpAddr;

use clap::Parser;
use parley_common::DEFAULT_PORT;

/// Parley signaling relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IP address to bind to (IPv4 or IPv6)
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, default_value = "false")]
    pub debug: bool,

    /// Announce peer connects and disconnects to every registered peer
    #[arg(long, default_value = "false")]
    pub presence: bool,

    /// Maximum concurrent connections per IP address (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub max_connections_per_ip: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["parleyd"]);
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.bind.to_string(), "0.0.0.0");
        assert!(!args.debug);
        assert!(!args.presence);
        assert_eq!(args.max_connections_per_ip, 0);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "parleyd",
            "--bind",
            "::1",
            "-p",
            "9000",
            "--presence",
            "--max-connections-per-ip",
            "4",
        ]);
        assert_eq!(args.bind.to_string(), "::1");
        assert_eq!(args.port, 9000);
        assert!(args.presence);
        assert_eq!(args.max_connections_per_ip, 4);
    }
}
