//! Non-blocking read/write primitives.
//!
//! [`try_read`] issues exactly one syscall and never retries; [`write_all`]
//! is the one internally looping call in the crate. All other retry and
//! backoff decisions belong to the caller's readiness loop, built on
//! [`wait_readable`] / [`wait_writable`].

use std::time::Duration;

use crate::{
    error::{Error, Result},
    socket::Socket,
    sys,
};

/// A `write_all` that could not complete.
///
/// Carries how many bytes made it onto the wire before the fatal error;
/// callers must not assume all-or-nothing delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("wrote {written} of {requested} bytes: {source}")]
pub struct PartialWrite {
    pub written: usize,
    pub requested: usize,
    #[source]
    pub source: Error,
}

/// Single read attempt into `buf`.
///
/// `Ok(0)` means the peer shut down cleanly. A would-block or interrupted
/// condition surfaces as [`Error::WouldBlock`]; wait for readability and call
/// again — this primitive never spins.
pub fn try_read(sock: &Socket, buf: &mut [u8]) -> Result<usize> {
    sys::recv(sock.check_valid()?, buf)
}

/// Write the whole of `buf`, retrying transient conditions immediately.
///
/// The busy retry is acceptable because callers either waited for
/// writability first or accept a CPU-bound retry for small sends. On a fatal
/// error the partial byte count is reported via [`PartialWrite`].
pub fn write_all(sock: &Socket, buf: &[u8]) -> std::result::Result<usize, PartialWrite> {
    let partial = |written, source| PartialWrite {
        written,
        requested: buf.len(),
        source,
    };

    let raw = sock.check_valid().map_err(|err| partial(0, err))?;

    let mut written = 0;

    while written < buf.len() {
        match sys::send(raw, &buf[written..]) {
            Ok(n) => written += n,
            Err(Error::WouldBlock) => continue,
            Err(err) => return Err(partial(written, err)),
        }
    }

    Ok(written)
}

/// Wait until `sock` is readable or `timeout` elapses.
///
/// Returns `Ok(false)` on timeout. This is the readiness notification the
/// framing and read primitives expect between [`Error::WouldBlock`] retries.
pub fn wait_readable(sock: &Socket, timeout: Duration) -> Result<bool> {
    sys::select_rw(sock.check_valid()?, true, false, timeout)
}

/// Wait until `sock` is writable or `timeout` elapses.
pub fn wait_writable(sock: &Socket, timeout: Duration) -> Result<bool> {
    sys::select_rw(sock.check_valid()?, false, true, timeout)
}
