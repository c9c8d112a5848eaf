//! Numeric address codec.
//!
//! Only numeric dotted/colon addresses are accepted; there is deliberately no
//! DNS resolution here, so encoding never allocates OS resources and never
//! blocks.

use std::net::{IpAddr, SocketAddr};

use os_socketaddr::OsSocketAddr;

use crate::{
    error::{Error, Result},
    socket::Socket,
    sys,
};

/// Convert a numeric host string and port into the platform address record.
///
/// Fails with [`Error::InvalidArgument`] when `host` is not a numeric IPv4 or
/// IPv6 address.
pub fn sock_addr(host: &str, port: u16) -> Result<OsSocketAddr> {
    let ip: IpAddr = host
        .parse()
        .map_err(|_| Error::InvalidArgument("host is not a numeric address"))?;

    Ok(SocketAddr::new(ip, port).into())
}

/// Render an address record back into `(host, port)`.
///
/// Best effort: a record the platform cannot convert back reports
/// [`Error::NotSupported`] rather than fabricating a value.
pub fn host_port(addr: &OsSocketAddr) -> Result<(String, u16)> {
    match addr.into_addr() {
        Some(sa) => Ok((sa.ip().to_string(), sa.port())),
        None => Err(Error::NotSupported),
    }
}

/// Remote endpoint of a connected socket, rendered as `(host, port)`.
pub fn peer_of(sock: &Socket) -> Result<(String, u16)> {
    let addr = sys::peer_addr(sock.check_valid()?)?;

    host_port(&addr)
}

#[cfg(test)]
mod tests {
    use super::{host_port, sock_addr};
    use crate::Error;

    #[test]
    fn test_roundtrip_v4() {
        let addr = sock_addr("127.0.0.1", 8080).unwrap();

        assert_eq!(host_port(&addr).unwrap(), ("127.0.0.1".to_owned(), 8080));
    }

    #[test]
    fn test_roundtrip_v6() {
        let addr = sock_addr("::1", 1812).unwrap();

        assert_eq!(host_port(&addr).unwrap(), ("::1".to_owned(), 1812));
    }

    #[test]
    fn test_rejects_hostname() {
        // No DNS resolution.
        assert!(matches!(
            sock_addr("localhost", 80),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(sock_addr("999.1.2.3", 80).is_err());
        assert!(sock_addr("", 80).is_err());
    }
}
