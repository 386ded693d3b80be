//! Local network checks used before starting the proxy.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

/// Default timeout for a port check.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Host to connect to for a proxy bound to `listen_host`.
///
/// Wildcard addresses are reached through loopback.
pub fn connect_host(listen_host: &str) -> &str {
    match listen_host {
        "" | "0.0.0.0" => "127.0.0.1",
        "::" | "[::]" => "::1",
        other => other,
    }
}

/// Returns true if something already accepts connections on the port.
pub fn port_in_use(listen_host: &str, port: u16, timeout: Duration) -> bool {
    let host = connect_host(listen_host).trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!("Could not resolve {}: {}", host, e);
            return false;
        }
    };

    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, timeout).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn wildcard_hosts_map_to_loopback() {
        assert_eq!(connect_host("0.0.0.0"), "127.0.0.1");
        assert_eq!(connect_host("::"), "::1");
        assert_eq!(connect_host("192.168.1.10"), "192.168.1.10");
    }

    #[test]
    fn detects_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(port_in_use("0.0.0.0", port, DEFAULT_CONNECT_TIMEOUT));
    }

    #[test]
    fn free_port_is_not_in_use() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        assert!(!port_in_use("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT));
    }
}
