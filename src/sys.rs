//! BSD-socket backend of the platform shim.
//!
//! Every syscall wrapper classifies the OS error exactly once, at the point
//! of failure, into the crate [`Error`](crate::Error) taxonomy. Nothing in
//! the layers above re-inspects platform error codes.

use std::{mem::size_of, ptr::null_mut, time::Duration};

use errno::{errno, set_errno};
use os_socketaddr::OsSocketAddr;

use crate::error::{Error, Result};

/// Raw platform socket handle.
pub type RawSock = std::os::fd::RawFd;

/// Sentinel distinct from every valid handle.
pub const INVALID_SOCK: RawSock = -1;

/// Process-wide networking startup. Only Winsock needs it; a no-op here.
pub fn startup(_major: u8, _minor: u8) -> Result<()> {
    Ok(())
}

/// Pair of [`startup`]. No-op on this backend.
pub fn cleanup() {}

/// Fetch the pending error code without clobbering it.
fn last_error() -> i32 {
    let e = errno();
    set_errno(e);
    e.0
}

/// Map an OS error code onto the crate taxonomy. Would-block and interrupted
/// conditions are the retry signal; everything else is fatal for the call.
fn classify(code: i32) -> Error {
    if code == libc::EAGAIN || code == libc::EWOULDBLOCK || code == libc::EINTR {
        Error::WouldBlock
    } else {
        Error::Os(code)
    }
}

/// Create a TCP stream socket, immediately placed in non-blocking mode.
///
/// Non-blocking is the crate-wide default policy; blocking mode is the
/// exception and is toggled explicitly per call site.
pub fn tcp(ipv4: bool) -> Result<RawSock> {
    use libc::*;

    unsafe {
        let fd = if ipv4 {
            socket(AF_INET, SOCK_STREAM, 0)
        } else {
            socket(AF_INET6, SOCK_STREAM, 0)
        };

        if fd < 0 {
            return Err(Error::Os(last_error()));
        }

        if let Err(err) = set_nonblocking(fd, true) {
            // Ignore close error.
            libc::close(fd);
            return Err(err);
        }

        log::trace!(target: "sockframe", "socket({}) created", fd);

        Ok(fd)
    }
}

/// Release the OS resources behind `sock`.
pub fn close(sock: RawSock) -> Result<()> {
    log::trace!(target: "sockframe", "close socket({})", sock);

    if unsafe { libc::close(sock) } < 0 {
        Err(Error::Os(last_error()))
    } else {
        Ok(())
    }
}

/// Toggle `O_NONBLOCK`. Idempotent; no side effect beyond the flag change.
pub fn set_nonblocking(sock: RawSock, on: bool) -> Result<()> {
    use libc::*;

    unsafe {
        let flags = fcntl(sock, F_GETFL);

        if flags < 0 {
            return Err(Error::Os(last_error()));
        }

        let flags = if on {
            flags | O_NONBLOCK
        } else {
            flags & !O_NONBLOCK
        };

        if fcntl(sock, F_SETFL, flags) < 0 {
            return Err(Error::Os(last_error()));
        }
    }

    Ok(())
}

/// Single recv attempt. `Ok(0)` is a clean peer shutdown.
pub fn recv(sock: RawSock, buf: &mut [u8]) -> Result<usize> {
    use libc::c_void;

    let len = unsafe { libc::recv(sock, buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };

    if len < 0 {
        Err(classify(last_error()))
    } else {
        log::trace!(target: "sockframe", "socket({}) recv bytes({})", sock, len);
        Ok(len as usize)
    }
}

/// Single send attempt.
pub fn send(sock: RawSock, buf: &[u8]) -> Result<usize> {
    use libc::c_void;

    let len = unsafe { libc::send(sock, buf.as_ptr() as *const c_void, buf.len(), 0) };

    if len < 0 {
        Err(classify(last_error()))
    } else {
        log::trace!(target: "sockframe", "socket({}) send bytes({})", sock, len);
        Ok(len as usize)
    }
}

/// Issue a connect. On a non-blocking socket an in-progress attempt surfaces
/// as [`Error::WouldBlock`]; an already-established connection is success.
pub fn connect(sock: RawSock, addr: &OsSocketAddr) -> Result<()> {
    if unsafe { libc::connect(sock, addr.as_ptr(), addr.len()) } < 0 {
        let code = last_error();

        if code == libc::EINPROGRESS {
            return Err(Error::WouldBlock);
        }

        if code == libc::EISCONN {
            return Ok(());
        }

        return Err(classify(code));
    }

    Ok(())
}

/// Set `SO_REUSEADDR` so a restarted listener does not collide with sockets
/// lingering in teardown.
pub fn set_reuse_addr(sock: RawSock) -> Result<()> {
    use libc::*;

    unsafe {
        let on: c_int = 1;

        if setsockopt(
            sock,
            SOL_SOCKET,
            SO_REUSEADDR,
            &on as *const c_int as *const c_void,
            size_of::<c_int>() as socklen_t,
        ) < 0
        {
            return Err(Error::Os(last_error()));
        }
    }

    Ok(())
}

pub fn bind(sock: RawSock, addr: &OsSocketAddr) -> Result<()> {
    if unsafe { libc::bind(sock, addr.as_ptr(), addr.len()) } < 0 {
        Err(Error::Os(last_error()))
    } else {
        Ok(())
    }
}

pub fn listen(sock: RawSock, backlog: i32) -> Result<()> {
    if unsafe { libc::listen(sock, backlog) } < 0 {
        Err(Error::Os(last_error()))
    } else {
        Ok(())
    }
}

/// Accept one pending connection. No pending connection surfaces as
/// [`Error::WouldBlock`].
pub fn accept(sock: RawSock) -> Result<(RawSock, OsSocketAddr)> {
    use libc::*;

    unsafe {
        let mut remote = [0u8; size_of::<sockaddr_in6>()];

        let mut len = remote.len() as socklen_t;

        let conn_fd = libc::accept(
            sock,
            remote.as_mut_ptr() as *mut sockaddr,
            &mut len as *mut socklen_t,
        );

        if conn_fd < 0 {
            return Err(classify(last_error()));
        }

        let addr = OsSocketAddr::copy_from_raw(remote.as_mut_ptr() as *mut sockaddr, len);

        log::trace!(target: "sockframe", "socket({}) accept connection({})", sock, conn_fd);

        Ok((conn_fd, addr))
    }
}

/// Read and clear the pending socket error (`SO_ERROR`). Zero means the last
/// asynchronous operation on the socket completed cleanly.
pub fn take_error(sock: RawSock) -> Result<i32> {
    use libc::*;

    unsafe {
        let mut code: c_int = 0;

        let mut len = size_of::<c_int>() as socklen_t;

        if getsockopt(
            sock,
            SOL_SOCKET,
            SO_ERROR,
            &mut code as *mut c_int as *mut c_void,
            &mut len as *mut socklen_t,
        ) < 0
        {
            return Err(Error::Os(last_error()));
        }

        Ok(code)
    }
}

/// Remote endpoint of a connected socket.
pub fn peer_addr(sock: RawSock) -> Result<OsSocketAddr> {
    use libc::*;

    unsafe {
        let mut remote = [0u8; size_of::<sockaddr_in6>()];

        let mut len = remote.len() as socklen_t;

        if getpeername(
            sock,
            remote.as_mut_ptr() as *mut sockaddr,
            &mut len as *mut socklen_t,
        ) < 0
        {
            return Err(Error::Os(last_error()));
        }

        Ok(OsSocketAddr::copy_from_raw(
            remote.as_mut_ptr() as *mut sockaddr,
            len,
        ))
    }
}

/// Multiplexed wait on a single handle, bounded by `timeout`.
///
/// Returns `Ok(true)` when the handle became ready for any of the requested
/// directions, `Ok(false)` when the wait timed out.
pub fn select_rw(sock: RawSock, want_read: bool, want_write: bool, timeout: Duration) -> Result<bool> {
    use libc::*;

    unsafe {
        let mut rset: fd_set = std::mem::zeroed();
        let mut wset: fd_set = std::mem::zeroed();

        FD_ZERO(&mut rset);
        FD_ZERO(&mut wset);

        if want_read {
            FD_SET(sock, &mut rset);
        }

        if want_write {
            FD_SET(sock, &mut wset);
        }

        let mut tv = timeval {
            tv_sec: timeout.as_secs() as time_t,
            tv_usec: timeout.subsec_micros() as suseconds_t,
        };

        let ret = select(
            sock + 1,
            if want_read { &mut rset as *mut fd_set } else { null_mut() },
            if want_write { &mut wset as *mut fd_set } else { null_mut() },
            null_mut(),
            &mut tv,
        );

        if ret < 0 {
            return Err(classify(last_error()));
        }

        Ok(ret > 0)
    }
}
