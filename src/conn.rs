//! Connection establishment: active connect with an optional bounded wait,
//! and passive bind/listen/accept.

use std::time::Duration;

use crate::{
    addr,
    context::NetContext,
    error::{Error, Result},
    socket::Socket,
    sys,
};

/// Bound on an active connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTimeout {
    /// Flip the socket to blocking mode, connect, flip back. No timeout
    /// machinery runs in this path.
    Block,
    /// Non-blocking connect followed by a multiplexed wait bounded by this
    /// duration. Out-of-range values are clamped (see [`clamp_wait`]).
    Wait(Duration),
}

const WAIT_MIN: Duration = Duration::from_millis(1000);
const WAIT_MAX: Duration = Duration::from_millis(15000);
const WAIT_DEFAULT: Duration = Duration::from_millis(4000);

/// Clamp a connect wait to `[1000ms, 15000ms]`, substituting the default for
/// out-of-range requests. The select-style wait is unreliable outside that
/// band on the target platforms.
fn clamp_wait(timeout: Duration) -> Duration {
    if timeout < WAIT_MIN || timeout > WAIT_MAX {
        WAIT_DEFAULT
    } else {
        timeout
    }
}

fn is_v4(addr: &os_socketaddr::OsSocketAddr) -> bool {
    addr.into_addr().map(|sa| sa.is_ipv4()).unwrap_or(true)
}

/// Actively connect to `host:port`.
///
/// The returned socket is in non-blocking mode, in both timeout flavors.
/// Refusal and silence stay distinguishable: an answered-but-rejected attempt
/// is [`Error::Failed`] with the native code, an unanswered one within the
/// bound is [`Error::TimedOut`].
pub fn connect(
    ctx: &NetContext,
    host: &str,
    port: u16,
    timeout: ConnectTimeout,
) -> Result<Socket> {
    let remote = addr::sock_addr(host, port)?;

    let sock = Socket::tcp(ctx, is_v4(&remote))?;

    match timeout {
        ConnectTimeout::Block => {
            log::debug!(target: "sockframe", "socket({}) blocking connect {}:{}", sock.raw(), host, port);

            sock.set_nonblocking(false)?;

            let outcome = sys::connect(sock.raw(), &remote);

            sock.set_nonblocking(true)?;

            match outcome {
                Ok(()) => Ok(sock),
                Err(Error::Os(code)) => Err(Error::Failed(code)),
                Err(err) => Err(err),
            }
        }
        ConnectTimeout::Wait(timeout) => {
            log::debug!(target: "sockframe", "socket({}) connect {}:{} timeout {:?}", sock.raw(), host, port, timeout);

            match sys::connect(sock.raw(), &remote) {
                Ok(()) => Ok(sock),
                Err(Error::WouldBlock) => {
                    // In progress: wait on both readability and writability,
                    // then let the pending socket error decide the outcome.
                    if sys::select_rw(sock.raw(), true, true, clamp_wait(timeout))? {
                        match sys::take_error(sock.raw())? {
                            0 => Ok(sock),
                            code => Err(Error::Failed(code)),
                        }
                    } else {
                        Err(Error::TimedOut)
                    }
                }
                Err(Error::Os(code)) => Err(Error::Failed(code)),
                Err(err) => Err(err),
            }
        }
    }
}

/// Passively bind `host:port` and start listening with the given backlog.
///
/// Address reuse is set before bind so a restarted listener does not collide
/// with sockets lingering in teardown.
pub fn listen(ctx: &NetContext, host: &str, port: u16, backlog: i32) -> Result<Socket> {
    if backlog <= 0 {
        return Err(Error::InvalidArgument("listen backlog must be positive"));
    }

    let local = addr::sock_addr(host, port)?;

    let sock = Socket::tcp(ctx, is_v4(&local))?;

    sys::set_reuse_addr(sock.raw())?;

    sys::bind(sock.raw(), &local)?;

    sys::listen(sock.raw(), backlog)?;

    log::debug!(target: "sockframe", "socket({}) listening on {}:{} backlog {}", sock.raw(), host, port, backlog);

    Ok(sock)
}

/// Accept one pending connection from a listening socket.
///
/// Surfaces [`Error::WouldBlock`] when no connection is queued; wait for
/// readability on the listener and call again. The accepted handle inherits
/// nothing from the listener — in particular the caller decides its blocking
/// mode via [`Socket::set_nonblocking`].
pub fn accept(listener: &Socket) -> Result<(Socket, Option<(String, u16)>)> {
    let (raw, remote) = sys::accept(listener.check_valid()?)?;

    let peer = addr::host_port(&remote).ok();

    Ok((Socket::from_raw(raw), peer))
}

/// One-knob establishment: `backlog > 0` selects passive bind+listen,
/// anything else an active connect.
pub fn establish(
    ctx: &NetContext,
    host: &str,
    port: u16,
    backlog: i32,
    timeout: ConnectTimeout,
) -> Result<Socket> {
    if backlog > 0 {
        listen(ctx, host, port, backlog)
    } else {
        connect(ctx, host, port, timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::clamp_wait;

    #[test]
    fn test_clamp_wait() {
        // In range passes through untouched.
        assert_eq!(
            clamp_wait(Duration::from_millis(1000)),
            Duration::from_millis(1000)
        );
        assert_eq!(
            clamp_wait(Duration::from_millis(15000)),
            Duration::from_millis(15000)
        );
        assert_eq!(
            clamp_wait(Duration::from_millis(2500)),
            Duration::from_millis(2500)
        );

        // Out of range substitutes the default.
        assert_eq!(
            clamp_wait(Duration::from_millis(999)),
            Duration::from_millis(4000)
        );
        assert_eq!(clamp_wait(Duration::ZERO), Duration::from_millis(4000));
        assert_eq!(
            clamp_wait(Duration::from_secs(60)),
            Duration::from_millis(4000)
        );
    }
}
