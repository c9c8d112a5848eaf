use crate::{error::Result, sys};

/// Process-wide networking context.
///
/// Winsock requires a `WSAStartup`/`WSACleanup` bracket around all socket
/// use; on BSD-socket platforms both are no-ops. Instead of a hidden global,
/// the bracket is an owned value: [`NetContext::init`] performs startup and
/// `Drop` performs teardown. Socket-creating operations borrow the context,
/// so use-before-init cannot be expressed.
///
/// The context is deliberately not `Clone` and not reference-counted; the
/// caller serializes creation and destruction around program startup and
/// shutdown.
#[derive(Debug)]
pub struct NetContext {
    _priv: (),
}

impl NetContext {
    /// Prepare process-wide networking state, requesting Winsock protocol
    /// version `major.minor` where that applies.
    pub fn init(major: u8, minor: u8) -> Result<NetContext> {
        sys::startup(major, minor)?;

        Ok(NetContext { _priv: () })
    }
}

impl Drop for NetContext {
    fn drop(&mut self) {
        sys::cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::NetContext;

    #[test]
    fn test_init_fini() {
        let ctx = NetContext::init(2, 2).unwrap();

        drop(ctx);

        // A fresh bracket after teardown must succeed.
        NetContext::init(2, 2).unwrap();
    }
}
