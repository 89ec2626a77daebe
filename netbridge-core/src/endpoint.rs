//! Endpoint parsing for coordinator and worker addresses.
//!
//! Only TCP is carried. An endpoint is written either as `tcp://host:port`
//! or as a bare `host:port`; the host must be a literal IPv4/IPv6 address.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Transport endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP transport: `tcp://host:port`
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use netbridge_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:1300").unwrap();
    /// assert_eq!(endpoint.socket_addr().port(), 1300);
    ///
    /// let bare = Endpoint::parse("[::1]:1300").unwrap();
    /// assert!(bare.socket_addr().is_ipv6());
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// The socket address to bind or connect to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        match self {
            Self::Tcp(addr) => *addr,
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::Tcp(addr)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = match s.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some(_) => return Err(EndpointError::InvalidScheme(s.to_string())),
            None => s,
        };
        addr.parse::<SocketAddr>()
            .map(Endpoint::Tcp)
            .map_err(|_| EndpointError::InvalidTcpAddress(addr.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp:// or host:port)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_ipv4() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:1300").unwrap();
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:1300");
    }

    #[test]
    fn test_parse_tcp_ipv6() {
        let endpoint = Endpoint::parse("tcp://[::1]:5555").unwrap();
        assert!(endpoint.socket_addr().is_ipv6());
    }

    #[test]
    fn test_parse_bare_address() {
        let endpoint = Endpoint::parse("0.0.0.0:1300").unwrap();
        assert_eq!(endpoint.socket_addr(), "0.0.0.0:1300".parse().unwrap());
    }

    #[test]
    fn test_invalid_scheme() {
        let result = Endpoint::parse("ipc:///tmp/coordinator.sock");
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn test_invalid_tcp_address() {
        let result = Endpoint::parse("tcp://localhost:port");
        assert!(matches!(result, Err(EndpointError::InvalidTcpAddress(_))));
    }
}
