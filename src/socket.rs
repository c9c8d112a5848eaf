use crate::{
    context::NetContext,
    error::{Error, Result},
    sys,
};

/// Owned socket handle.
///
/// The handle is exclusively owned: closing invalidates it in place, and a
/// second close is a deterministic [`Error::InvalidArgument`] rather than a
/// double-close against the OS. `Drop` closes a still-valid handle.
#[derive(Debug)]
pub struct Socket {
    raw: sys::RawSock,
}

impl Socket {
    /// Create a TCP stream socket in non-blocking mode.
    ///
    /// Non-blocking is the default policy for every handle this crate
    /// creates; call [`Socket::set_nonblocking`] to opt out per call site.
    pub fn tcp(_ctx: &NetContext, ipv4: bool) -> Result<Socket> {
        Ok(Socket { raw: sys::tcp(ipv4)? })
    }

    pub(crate) fn from_raw(raw: sys::RawSock) -> Socket {
        Socket { raw }
    }

    /// The underlying platform handle.
    pub fn raw(&self) -> sys::RawSock {
        self.raw
    }

    /// Whether this handle has not been closed yet.
    pub fn is_valid(&self) -> bool {
        self.raw != sys::INVALID_SOCK
    }

    pub(crate) fn check_valid(&self) -> Result<sys::RawSock> {
        if self.is_valid() {
            Ok(self.raw)
        } else {
            Err(Error::InvalidArgument("socket already closed"))
        }
    }

    /// Close and invalidate the handle.
    ///
    /// Closing is the only cancellation primitive: any in-flight operation
    /// observing the invalidated handle fails with
    /// [`Error::InvalidArgument`] instead of blocking.
    pub fn close(&mut self) -> Result<()> {
        let raw = self.check_valid()?;

        self.raw = sys::INVALID_SOCK;

        sys::close(raw)
    }

    /// Toggle blocking mode. Idempotent.
    pub fn set_nonblocking(&self, on: bool) -> Result<()> {
        sys::set_nonblocking(self.check_valid()?, on)
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.is_valid() {
            _ = sys::close(self.raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Socket;
    use crate::{Error, NetContext};

    #[test]
    fn test_close_invalidates() {
        let ctx = NetContext::init(2, 2).unwrap();

        let mut sock = Socket::tcp(&ctx, true).unwrap();

        assert!(sock.is_valid());

        sock.close().unwrap();

        assert!(!sock.is_valid());

        // Second close is a no-op error, never a double close.
        assert_eq!(
            sock.close(),
            Err(Error::InvalidArgument("socket already closed"))
        );
    }

    #[test]
    fn test_blocking_toggle_idempotent() {
        let ctx = NetContext::init(2, 2).unwrap();

        let sock = Socket::tcp(&ctx, true).unwrap();

        sock.set_nonblocking(true).unwrap();
        sock.set_nonblocking(true).unwrap();
        sock.set_nonblocking(false).unwrap();
        sock.set_nonblocking(true).unwrap();
    }
}
