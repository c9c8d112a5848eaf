//! Winsock backend of the platform shim.
//!
//! Mirrors the BSD-socket backend surface one for one. Error codes come from
//! `WSAGetLastError` and are classified once, at the point of failure.

use std::{mem::size_of, ptr::null_mut, time::Duration};

use os_socketaddr::OsSocketAddr;
use winapi::{
    shared::winerror::{WSAEINPROGRESS, WSAEINTR, WSAEISCONN, WSAEWOULDBLOCK},
    shared::ws2def::{AF_INET, AF_INET6, SOCKADDR},
    shared::ws2ipdef::SOCKADDR_IN6_LH,
    um::winsock2::{
        self, fd_set, timeval, u_long, FIONBIO, INVALID_SOCKET, SOCKET, SOCKET_ERROR, SOCK_STREAM,
        SOL_SOCKET, SO_ERROR, SO_REUSEADDR, WSADATA,
    },
};

use crate::error::{Error, Result};

/// Raw platform socket handle.
pub type RawSock = SOCKET;

/// Sentinel distinct from every valid handle.
pub const INVALID_SOCK: RawSock = INVALID_SOCKET;

/// Start the Winsock subsystem, requesting protocol version `major.minor`.
///
/// Must be paired with [`cleanup`]. Fails when the DLL cannot supply the
/// requested version.
pub fn startup(major: u8, minor: u8) -> Result<()> {
    unsafe {
        let mut wsa_data: WSADATA = std::mem::zeroed();

        let requested = u16::from_le_bytes([major, minor]);

        let code = winsock2::WSAStartup(requested, &mut wsa_data);

        if code != 0 {
            return Err(Error::Failed(code));
        }

        if wsa_data.wVersion != requested {
            winsock2::WSACleanup();
            return Err(Error::NotSupported);
        }

        log::trace!(target: "sockframe", "WSAStartup {}.{}", major, minor);
    }

    Ok(())
}

/// Pair of [`startup`].
pub fn cleanup() {
    unsafe {
        winsock2::WSACleanup();
    }
}

fn last_error() -> i32 {
    unsafe { winsock2::WSAGetLastError() }
}

/// Map an OS error code onto the crate taxonomy. Would-block and interrupted
/// conditions are the retry signal; everything else is fatal for the call.
fn classify(code: i32) -> Error {
    if code == WSAEWOULDBLOCK as i32 || code == WSAEINTR as i32 {
        Error::WouldBlock
    } else {
        Error::Os(code)
    }
}

/// Create a TCP stream socket, immediately placed in non-blocking mode.
///
/// Non-blocking is the crate-wide default policy; blocking mode is the
/// exception, toggled explicitly per call site.
pub fn tcp(ipv4: bool) -> Result<RawSock> {
    unsafe {
        let sock = if ipv4 {
            winsock2::socket(AF_INET, SOCK_STREAM, 0)
        } else {
            winsock2::socket(AF_INET6, SOCK_STREAM, 0)
        };

        if sock == INVALID_SOCKET {
            return Err(Error::Os(last_error()));
        }

        if let Err(err) = set_nonblocking(sock, true) {
            winsock2::closesocket(sock);
            return Err(err);
        }

        log::trace!(target: "sockframe", "socket({}) created", sock);

        Ok(sock)
    }
}

/// Release the OS resources behind `sock`.
pub fn close(sock: RawSock) -> Result<()> {
    log::trace!(target: "sockframe", "close socket({})", sock);

    if unsafe { winsock2::closesocket(sock) } == SOCKET_ERROR {
        Err(Error::Os(last_error()))
    } else {
        Ok(())
    }
}

/// Toggle `FIONBIO`. Idempotent; no side effect beyond the flag change.
pub fn set_nonblocking(sock: RawSock, on: bool) -> Result<()> {
    unsafe {
        let mut mode: u_long = if on { 1 } else { 0 };

        if winsock2::ioctlsocket(sock, FIONBIO as i32, &mut mode) == SOCKET_ERROR {
            return Err(Error::Os(last_error()));
        }
    }

    Ok(())
}

/// Single recv attempt. `Ok(0)` is a clean peer shutdown.
pub fn recv(sock: RawSock, buf: &mut [u8]) -> Result<usize> {
    let len =
        unsafe { winsock2::recv(sock, buf.as_mut_ptr() as *mut i8, buf.len() as i32, 0) };

    if len == SOCKET_ERROR {
        Err(classify(last_error()))
    } else {
        log::trace!(target: "sockframe", "socket({}) recv bytes({})", sock, len);
        Ok(len as usize)
    }
}

/// Single send attempt.
pub fn send(sock: RawSock, buf: &[u8]) -> Result<usize> {
    let len = unsafe { winsock2::send(sock, buf.as_ptr() as *const i8, buf.len() as i32, 0) };

    if len == SOCKET_ERROR {
        Err(classify(last_error()))
    } else {
        log::trace!(target: "sockframe", "socket({}) send bytes({})", sock, len);
        Ok(len as usize)
    }
}

/// Issue a connect. On a non-blocking socket an in-progress attempt surfaces
/// as [`Error::WouldBlock`]; an already-established connection is success.
pub fn connect(sock: RawSock, addr: &OsSocketAddr) -> Result<()> {
    let ret = unsafe {
        winsock2::connect(sock, addr.as_ptr() as *const SOCKADDR, addr.len() as i32)
    };

    if ret == SOCKET_ERROR {
        let code = last_error();

        if code == WSAEWOULDBLOCK as i32 || code == WSAEINPROGRESS as i32 {
            return Err(Error::WouldBlock);
        }

        if code == WSAEISCONN as i32 {
            return Ok(());
        }

        return Err(classify(code));
    }

    Ok(())
}

/// Set `SO_REUSEADDR` so a restarted listener does not collide with sockets
/// lingering in teardown.
pub fn set_reuse_addr(sock: RawSock) -> Result<()> {
    unsafe {
        let on: i32 = 1;

        if winsock2::setsockopt(
            sock,
            SOL_SOCKET,
            SO_REUSEADDR,
            &on as *const i32 as *const i8,
            size_of::<i32>() as i32,
        ) == SOCKET_ERROR
        {
            return Err(Error::Os(last_error()));
        }
    }

    Ok(())
}

pub fn bind(sock: RawSock, addr: &OsSocketAddr) -> Result<()> {
    let ret = unsafe {
        winsock2::bind(sock, addr.as_ptr() as *const SOCKADDR, addr.len() as i32)
    };

    if ret == SOCKET_ERROR {
        Err(Error::Os(last_error()))
    } else {
        Ok(())
    }
}

pub fn listen(sock: RawSock, backlog: i32) -> Result<()> {
    if unsafe { winsock2::listen(sock, backlog) } == SOCKET_ERROR {
        Err(Error::Os(last_error()))
    } else {
        Ok(())
    }
}

/// Accept one pending connection. No pending connection surfaces as
/// [`Error::WouldBlock`].
pub fn accept(sock: RawSock) -> Result<(RawSock, OsSocketAddr)> {
    unsafe {
        let mut remote = [0u8; size_of::<SOCKADDR_IN6_LH>()];

        let mut len = remote.len() as i32;

        let conn = winsock2::accept(sock, remote.as_mut_ptr() as *mut SOCKADDR, &mut len);

        if conn == INVALID_SOCKET {
            return Err(classify(last_error()));
        }

        let addr = OsSocketAddr::copy_from_raw(remote.as_mut_ptr() as *const SOCKADDR, len);

        log::trace!(target: "sockframe", "socket({}) accept connection({})", sock, conn);

        Ok((conn, addr))
    }
}

/// Read and clear the pending socket error (`SO_ERROR`). Zero means the last
/// asynchronous operation on the socket completed cleanly.
pub fn take_error(sock: RawSock) -> Result<i32> {
    unsafe {
        let mut code: i32 = 0;

        let mut len = size_of::<i32>() as i32;

        if winsock2::getsockopt(
            sock,
            SOL_SOCKET,
            SO_ERROR,
            &mut code as *mut i32 as *mut i8,
            &mut len,
        ) == SOCKET_ERROR
        {
            return Err(Error::Os(last_error()));
        }

        Ok(code)
    }
}

/// Remote endpoint of a connected socket.
pub fn peer_addr(sock: RawSock) -> Result<OsSocketAddr> {
    unsafe {
        let mut remote = [0u8; size_of::<SOCKADDR_IN6_LH>()];

        let mut len = remote.len() as i32;

        if winsock2::getpeername(sock, remote.as_mut_ptr() as *mut SOCKADDR, &mut len)
            == SOCKET_ERROR
        {
            return Err(Error::Os(last_error()));
        }

        Ok(OsSocketAddr::copy_from_raw(
            remote.as_mut_ptr() as *const SOCKADDR,
            len,
        ))
    }
}

/// Multiplexed wait on a single handle, bounded by `timeout`.
///
/// Returns `Ok(true)` when the handle became ready for any of the requested
/// directions, `Ok(false)` when the wait timed out.
pub fn select_rw(sock: RawSock, want_read: bool, want_write: bool, timeout: Duration) -> Result<bool> {
    unsafe {
        let mut rset: fd_set = std::mem::zeroed();
        let mut wset: fd_set = std::mem::zeroed();

        if want_read {
            rset.fd_array[0] = sock;
            rset.fd_count = 1;
        }

        if want_write {
            wset.fd_array[0] = sock;
            wset.fd_count = 1;
        }

        let mut tv = timeval {
            tv_sec: timeout.as_secs() as i32,
            tv_usec: timeout.subsec_micros() as i32,
        };

        // Winsock ignores the first select() argument.
        let ret = winsock2::select(
            0,
            if want_read { &mut rset as *mut fd_set } else { null_mut() },
            if want_write { &mut wset as *mut fd_set } else { null_mut() },
            null_mut(),
            &mut tv,
        );

        if ret == SOCKET_ERROR {
            return Err(classify(last_error()));
        }

        Ok(ret > 0)
    }
}
