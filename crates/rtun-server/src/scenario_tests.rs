//! End-to-end scenarios driven against an in-process duplex channel, real
//! loopback TCP sockets, and a real child process — scenarios 1, 2, 4, and 6
//! from `spec.md` §8.

use crate::channel::{ChannelReader, ChannelWriter};
use crate::config::ServerConfig;
use crate::engine::Engine;
use rtun_core::messages::OpenAnswer;
use rtun_core::{Command, Frame, FrameDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn test_config() -> ServerConfig {
    ServerConfig {
        buffer_cap: 64 * 1024,
        af_preference: "any".to_string(),
        forward_chunk: 4096,
    }
}

/// Spin up an `Engine` against one half of an in-process duplex channel,
/// keeping the other half for the test to drive as the controller.
fn spawn_engine() -> tokio::io::DuplexStream {
    let (test_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let reader: ChannelReader = Box::new(server_read);
    let writer: ChannelWriter = Box::new(server_write);
    let engine = Engine::new(reader, writer, test_config());
    tokio::spawn(async move {
        let _ = engine.run().await;
    });
    test_side
}

async fn write_frame(stream: &mut tokio::io::DuplexStream, command: Command, id: u8, payload: &[u8]) {
    let bytes = rtun_core::emit(command as u8, id, payload).unwrap();
    stream.write_all(&bytes).await.unwrap();
}

async fn read_frame(stream: &mut tokio::io::DuplexStream, decoder: &mut FrameDecoder) -> Frame {
    loop {
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "channel closed while waiting for a frame");
        let frames = decoder.feed(&buf[..n]).unwrap();
        if let Some(frame) = frames.into_iter().next() {
            return frame;
        }
    }
}

#[tokio::test]
async fn tcp_connect_success_and_data_roundtrip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept_task = tokio::spawn(async move { listener.accept().await.unwrap().0 });

    let mut test_side = spawn_engine();
    let mut decoder = FrameDecoder::new();

    let req = rtun_core::messages::OpenRequest {
        address_family: 1,
        port,
        host: "127.0.0.1".to_string(),
    };
    write_frame(&mut test_side, Command::Conn, 0x10, &req.encode()).await;

    let answer = read_frame(&mut test_side, &mut decoder).await;
    assert_eq!(answer.command, Command::Conn as u8);
    assert_eq!(answer.tunnel_id, 0x10);
    match rtun_core::messages::decode_open_answer(&answer.payload).unwrap() {
        OpenAnswer::Ok(_) => {}
        OpenAnswer::Fail(code) => panic!("expected success, got {code:?}"),
    }

    let mut accepted = accept_task.await.unwrap();

    write_frame(&mut test_side, Command::Data, 0x10, b"GET / HTTP/1.0\r\n\r\n").await;

    let mut buf = vec![0u8; 64];
    let n = accepted.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"GET / HTTP/1.0\r\n\r\n");
}

#[tokio::test]
async fn tcp_connect_refused_emits_failure_and_no_close() {
    // Bind then immediately drop to get a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut test_side = spawn_engine();
    let mut decoder = FrameDecoder::new();

    let req = rtun_core::messages::OpenRequest {
        address_family: 1,
        port,
        host: "127.0.0.1".to_string(),
    };
    write_frame(&mut test_side, Command::Conn, 0x11, &req.encode()).await;

    let answer = read_frame(&mut test_side, &mut decoder).await;
    assert_eq!(answer.command, Command::Conn as u8);
    match rtun_core::messages::decode_open_answer(&answer.payload).unwrap() {
        OpenAnswer::Fail(_) => {}
        OpenAnswer::Ok(_) => panic!("expected connection refused"),
    }

    // No further record (in particular no CLOSE) should follow for this id
    // within a short window — the tunnel was never created.
    let mut buf = [0u8; 16];
    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(200), test_side.read(&mut buf))
        .await
        .is_err();
    assert!(timed_out, "no further record expected after a refused connect");
}

#[tokio::test]
async fn peer_close_emits_close_record() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept_task = tokio::spawn(async move { listener.accept().await.unwrap().0 });

    let mut test_side = spawn_engine();
    let mut decoder = FrameDecoder::new();

    let req = rtun_core::messages::OpenRequest {
        address_family: 1,
        port,
        host: "127.0.0.1".to_string(),
    };
    write_frame(&mut test_side, Command::Conn, 0x12, &req.encode()).await;
    let _ = read_frame(&mut test_side, &mut decoder).await;

    let accepted = accept_task.await.unwrap();
    drop(accepted); // peer closes

    let closed = read_frame(&mut test_side, &mut decoder).await;
    assert_eq!(closed.command, Command::Close as u8);
    assert_eq!(closed.tunnel_id, 0x12);
}

#[tokio::test]
async fn process_tunnel_echoes_stdin_to_stdout() {
    let mut test_side = spawn_engine();
    let mut decoder = FrameDecoder::new();

    let req = rtun_core::messages::OpenRequest {
        address_family: 0,
        port: 0,
        host: "cat".to_string(),
    };
    write_frame(&mut test_side, Command::Conn, 0x30, &req.encode()).await;

    let answer = read_frame(&mut test_side, &mut decoder).await;
    assert_eq!(answer.tunnel_id, 0x30);
    match rtun_core::messages::decode_open_answer(&answer.payload).unwrap() {
        OpenAnswer::Ok(_) => {}
        OpenAnswer::Fail(code) => panic!("expected process spawn to succeed, got {code:?}"),
    }

    write_frame(&mut test_side, Command::Data, 0x30, b"ping\n").await;

    let echoed = read_frame(&mut test_side, &mut decoder).await;
    assert_eq!(echoed.command, Command::Data as u8);
    assert_eq!(echoed.tunnel_id, 0x30);
    assert_eq!(echoed.payload, b"ping\n");
}
