use std::{
    thread::spawn,
    time::{Duration, Instant},
};

use sockframe::{addr, conn, frame, io, ConnectTimeout, Error, FrameBuffer, FrameStatus, NetContext, Socket};

const WAIT: Duration = Duration::from_secs(2);

/// Drive `next_frame` through the caller-owned readiness loop until it
/// produces something other than `NeedMore`.
fn read_frame(sock: &Socket, buf: &mut FrameBuffer, delim: u8) -> FrameStatus {
    loop {
        match frame::next_frame(sock, buf, delim).unwrap() {
            FrameStatus::NeedMore => {
                assert!(io::wait_readable(sock, WAIT).unwrap());
            }
            status => return status,
        }
    }
}

fn accept_one(listener: &Socket) -> Socket {
    assert!(io::wait_readable(listener, WAIT).unwrap());

    let (sock, peer) = conn::accept(listener).unwrap();

    assert_eq!(peer.unwrap().0, "127.0.0.1");

    sock.set_nonblocking(true).unwrap();

    sock
}

#[test]
fn test_framed_echo() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    let listener = conn::listen(&ctx, "127.0.0.1", 1860, 16).unwrap();

    let client = conn::connect(
        &ctx,
        "127.0.0.1",
        1860,
        ConnectTimeout::Wait(Duration::from_secs(3)),
    )
    .unwrap();

    let server = accept_one(&listener);

    let mut buf = FrameBuffer::with_capacity(64).unwrap();

    // "abc|def|gh" delivered across two sends.
    io::write_all(&client, b"abc|de").unwrap();

    match read_frame(&server, &mut buf, b'|') {
        FrameStatus::Ready(end) => assert_eq!(buf.frame(end), b"abc|"),
        status => panic!("unexpected status {:?}", status),
    }

    // The second chunk is not on the wire yet: the "de" tail stays buffered.
    assert_eq!(
        frame::next_frame(&server, &mut buf, b'|').unwrap(),
        FrameStatus::NeedMore
    );
    assert_eq!(buf.pending(), b"de");

    io::write_all(&client, b"f|gh").unwrap();

    match read_frame(&server, &mut buf, b'|') {
        FrameStatus::Ready(end) => assert_eq!(buf.frame(end), b"def|"),
        status => panic!("unexpected status {:?}", status),
    }

    // "gh" has no delimiter yet.
    assert_eq!(
        frame::next_frame(&server, &mut buf, b'|').unwrap(),
        FrameStatus::NeedMore
    );
    assert_eq!(buf.pending(), b"gh");

    // Clean client shutdown maps to Closed, with the tail still buffered.
    let mut client = client;
    client.close().unwrap();

    assert_eq!(read_frame(&server, &mut buf, b'|'), FrameStatus::Closed);
    assert_eq!(buf.pending(), b"gh");
}

#[test]
fn test_connect_refused_is_failed() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    let start = Instant::now();

    // Nothing listens on this port; refusal must be Failed, not TimedOut,
    // and must arrive well before the clamped wait bound.
    let result = conn::connect(
        &ctx,
        "127.0.0.1",
        1861,
        ConnectTimeout::Wait(Duration::from_millis(500)),
    );

    match result {
        Err(Error::Failed(code)) => assert!(code != 0),
        other => panic!("expected Failed, got {:?}", other.map(|_| ())),
    }

    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_write_all_under_backpressure() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    let listener = conn::listen(&ctx, "127.0.0.1", 1862, 16).unwrap();

    let client = conn::connect(
        &ctx,
        "127.0.0.1",
        1862,
        ConnectTimeout::Wait(Duration::from_secs(3)),
    )
    .unwrap();

    let server = accept_one(&listener);

    const TOTAL: usize = 4 * 1024 * 1024;

    // Drain on a peer thread and verify the byte pattern so duplicated or
    // dropped bytes would be caught.
    let reader = spawn(move || {
        let mut chunk = [0u8; 64 * 1024];
        let mut seen = 0usize;

        loop {
            match io::try_read(&server, &mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    for &b in &chunk[..n] {
                        assert_eq!(b, (seen % 251) as u8);
                        seen += 1;
                    }
                }
                Err(Error::WouldBlock) => {
                    assert!(io::wait_readable(&server, WAIT).unwrap());
                }
                Err(err) => panic!("read failed: {}", err),
            }
        }

        seen
    });

    let payload: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();

    // Far larger than the socket buffer: exercises the transient retry loop.
    assert_eq!(io::write_all(&client, &payload).unwrap(), TOTAL);

    let mut client = client;
    client.close().unwrap();

    assert_eq!(reader.join().unwrap(), TOTAL);
}

#[test]
fn test_accept_would_block_without_pending() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    let listener = conn::listen(&ctx, "127.0.0.1", 1863, 4).unwrap();

    assert!(matches!(conn::accept(&listener), Err(Error::WouldBlock)));
}

#[test]
fn test_peer_of_connected_socket() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    let listener = conn::listen(&ctx, "127.0.0.1", 1864, 4).unwrap();

    let client = conn::connect(
        &ctx,
        "127.0.0.1",
        1864,
        ConnectTimeout::Wait(Duration::from_secs(3)),
    )
    .unwrap();

    let _server = accept_one(&listener);

    assert_eq!(
        addr::peer_of(&client).unwrap(),
        ("127.0.0.1".to_owned(), 1864)
    );

    // A listener has no peer.
    assert!(addr::peer_of(&listener).is_err());
}

#[test]
fn test_primitives_reject_closed_handle() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    let mut sock = Socket::tcp(&ctx, true).unwrap();
    sock.close().unwrap();

    let mut chunk = [0u8; 8];

    assert!(matches!(
        io::try_read(&sock, &mut chunk),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        io::wait_readable(&sock, WAIT),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(
        io::write_all(&sock, b"x").unwrap_err().source,
        Error::InvalidArgument("socket already closed")
    );
}

#[test]
fn test_blocking_connect_refused() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    // Hard-blocking connect reports the bare outcome, no timeout machinery.
    assert!(matches!(
        conn::connect(&ctx, "127.0.0.1", 1865, ConnectTimeout::Block),
        Err(Error::Failed(_))
    ));
}

#[test]
fn test_oversize_frame_is_fatal_and_clear_recovers() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    let listener = conn::listen(&ctx, "127.0.0.1", 1867, 4).unwrap();

    let client = conn::connect(
        &ctx,
        "127.0.0.1",
        1867,
        ConnectTimeout::Wait(Duration::from_secs(3)),
    )
    .unwrap();

    let server = accept_one(&listener);

    let mut buf = FrameBuffer::with_capacity(8).unwrap();

    // Fill the buffer to capacity without ever sending a delimiter.
    io::write_all(&client, b"12345678").unwrap();

    let err = loop {
        match frame::next_frame(&server, &mut buf, b'|') {
            Ok(FrameStatus::NeedMore) => {
                assert!(io::wait_readable(&server, WAIT).unwrap());
            }
            Ok(status) => panic!("unexpected status {:?}", status),
            Err(err) => break err,
        }
    };

    assert_eq!(err, Error::FrameTooLarge);

    // The error is sticky until the caller discards the buffered bytes.
    assert_eq!(
        frame::next_frame(&server, &mut buf, b'|').unwrap_err(),
        Error::FrameTooLarge
    );

    buf.clear();

    io::write_all(&client, b"ok|").unwrap();

    match read_frame(&server, &mut buf, b'|') {
        FrameStatus::Ready(end) => assert_eq!(buf.frame(end), b"ok|"),
        status => panic!("unexpected status {:?}", status),
    }
}

#[test]
fn test_establish_dispatches_on_backlog() {
    _ = pretty_env_logger::try_init();

    let ctx = NetContext::init(2, 2).unwrap();

    // backlog > 0 selects passive mode.
    let listener = conn::establish(
        &ctx,
        "127.0.0.1",
        1866,
        8,
        ConnectTimeout::Wait(Duration::from_secs(3)),
    )
    .unwrap();

    // backlog <= 0 selects active mode.
    let client = conn::establish(
        &ctx,
        "127.0.0.1",
        1866,
        0,
        ConnectTimeout::Wait(Duration::from_secs(3)),
    )
    .unwrap();

    let server = accept_one(&listener);

    io::write_all(&client, b"ping;").unwrap();

    let mut buf = FrameBuffer::with_capacity(16).unwrap();

    match read_frame(&server, &mut buf, b';') {
        FrameStatus::Ready(end) => assert_eq!(buf.frame(end), b"ping;"),
        status => panic!("unexpected status {:?}", status),
    }
}
