//! Delimiter-based stream framing.
//!
//! A [`FrameBuffer`] accumulates socket reads and hands back complete
//! delimiter-terminated frames, keeping unconsumed bytes across calls. The
//! framing scheme is a single configured byte with no escaping: a delimiter
//! value occurring inside payload data breaks framing, by design.

use crate::{
    error::{Error, Result},
    io,
    socket::Socket,
};

/// Outcome of one [`next_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A complete frame occupies `[0, end)` of the buffer, delimiter
    /// included. Read it through [`FrameBuffer::frame`] before the next call.
    Ready(usize),
    /// No complete frame yet. Wait for readability and call again; all
    /// buffered bytes are retained.
    NeedMore,
    /// The peer shut down cleanly. Terminal for this connection.
    Closed,
}

/// Fixed-capacity receive buffer with an invariant-checked cursor.
///
/// Two indices partition the buffer: bytes in `[0, consumed_end)` belong to
/// frames already handed to the caller and are purged on the next call;
/// bytes in `[consumed_end, valid_end)` are received but not yet parsed.
/// `0 <= consumed_end <= valid_end <= capacity` holds at every exit.
///
/// A buffer serves exactly one connection and is mutated only by the framer
/// and the read primitive, never concurrently.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Box<[u8]>,
    consumed: usize,
    valid: usize,
}

impl FrameBuffer {
    /// Allocate a buffer. Capacity bounds the largest representable frame,
    /// delimiter included.
    pub fn with_capacity(capacity: usize) -> Result<FrameBuffer> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("frame buffer capacity is zero"));
        }

        Ok(FrameBuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            consumed: 0,
            valid: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes before this index are consumed and stale.
    pub fn consumed_end(&self) -> usize {
        self.consumed
    }

    /// Bytes before this index are valid received data.
    pub fn valid_end(&self) -> usize {
        self.valid
    }

    /// The frame produced by the last [`FrameStatus::Ready`].
    pub fn frame(&self, end: usize) -> &[u8] {
        &self.buf[..end]
    }

    /// Received-but-unparsed bytes.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.consumed..self.valid]
    }

    /// Drop all buffered state. The recovery path after
    /// [`Error::FrameTooLarge`].
    pub fn clear(&mut self) {
        self.consumed = 0;
        self.valid = 0;
    }

    /// Copy externally received bytes into the unparsed region.
    ///
    /// Returns the number of bytes copied; fails when `data` exceeds the
    /// remaining capacity. Lets the cursor be driven without a socket.
    pub fn append(&mut self, data: &[u8]) -> Result<usize> {
        if data.len() > self.capacity() - self.valid {
            return Err(Error::InvalidArgument("append exceeds buffer capacity"));
        }

        self.buf[self.valid..self.valid + data.len()].copy_from_slice(data);
        self.valid += data.len();

        self.check_invariant();

        Ok(data.len())
    }

    /// Purge consumed bytes, then scan the unparsed region for a frame.
    ///
    /// Compaction is the cheap reset when everything was consumed, otherwise
    /// a shift of `[consumed_end, valid_end)` down to index 0. No unparsed
    /// byte is ever dropped. On a hit, `consumed_end` moves just past the
    /// delimiter and the frame end is returned.
    pub fn take_frame(&mut self, delimiter: u8) -> Option<usize> {
        if self.consumed > 0 {
            if self.consumed == self.valid {
                self.consumed = 0;
                self.valid = 0;
            } else {
                self.buf.copy_within(self.consumed..self.valid, 0);
                self.valid -= self.consumed;
                self.consumed = 0;
            }
        }

        let hit = self.scan(0, delimiter);

        self.check_invariant();

        hit
    }

    /// Scan `[from, valid_end)` for the delimiter; on a hit advance
    /// `consumed_end` past it and return the frame end.
    fn scan(&mut self, from: usize, delimiter: u8) -> Option<usize> {
        debug_assert!(self.consumed == 0);

        match self.buf[from..self.valid].iter().position(|&b| b == delimiter) {
            Some(pos) => {
                self.consumed = from + pos + 1;
                Some(self.consumed)
            }
            None => None,
        }
    }

    fn check_invariant(&self) {
        debug_assert!(
            self.consumed <= self.valid && self.valid <= self.capacity(),
            "frame buffer cursor out of bounds: consumed {} valid {} capacity {}",
            self.consumed,
            self.valid,
            self.capacity()
        );
    }
}

/// Extract the next delimiter-terminated frame from `sock`.
///
/// One call performs at most one read: first the buffered bytes are
/// compacted and scanned, and only if that produces no frame is a single
/// [`io::try_read`] issued into the remaining capacity. `WouldBlock` maps to
/// [`FrameStatus::NeedMore`], a zero-byte read to [`FrameStatus::Closed`],
/// and capacity exhaustion without a delimiter to [`Error::FrameTooLarge`]
/// rather than silent overwrite.
pub fn next_frame(sock: &Socket, buf: &mut FrameBuffer, delimiter: u8) -> Result<FrameStatus> {
    if let Some(end) = buf.take_frame(delimiter) {
        log::trace!(target: "sockframe", "socket({}) frame bytes({}) from buffer", sock.raw(), end);

        return Ok(FrameStatus::Ready(end));
    }

    if buf.valid == buf.capacity() {
        return Err(Error::FrameTooLarge);
    }

    let read = {
        let valid = buf.valid;
        io::try_read(sock, &mut buf.buf[valid..])
    };

    match read {
        Err(Error::WouldBlock) => Ok(FrameStatus::NeedMore),
        Err(err) => Err(err),
        Ok(0) => Ok(FrameStatus::Closed),
        Ok(n) => {
            let scan_from = buf.valid;

            buf.valid += n;

            let status = match buf.scan(scan_from, delimiter) {
                Some(end) => {
                    log::trace!(target: "sockframe", "socket({}) frame bytes({})", sock.raw(), end);

                    FrameStatus::Ready(end)
                }
                None if buf.valid == buf.capacity() => {
                    buf.check_invariant();

                    return Err(Error::FrameTooLarge);
                }
                None => FrameStatus::NeedMore,
            };

            buf.check_invariant();

            Ok(status)
        }
    }
}
