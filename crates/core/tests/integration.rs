//! Integration tests: full RTSP handshakes against a live server, with real
//! UDP and interleaved TCP media delivery.
//!
//! Each test starts its own server on a fixed localhost port, connects with
//! a plain TCP client, and drives the protocol by hand.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use hevc_rtsp::{OverflowStrategy, Server, ServerConfig};

fn start_server(port: u16, tweak: impl FnOnce(&mut ServerConfig)) -> Server {
    let mut config = ServerConfig {
        port,
        ..ServerConfig::default()
    };
    tweak(&mut config);
    let mut server = Server::new(config);
    server.start().expect("server start");
    server
}

fn connect(port: u16) -> TcpStream {
    let addr = format!("127.0.0.1:{}", port)
        .to_socket_addrs()
        .unwrap()
        .next()
        .unwrap();
    let stream =
        TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect to server");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    // Read the body if a Content-Length is present.
    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if len > 0 {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            response.push_str(&String::from_utf8_lossy(&body));
        }
    }

    Ok(response)
}

fn session_id_from_sdp(describe_response: &str) -> String {
    describe_response
        .lines()
        .find_map(|l| l.strip_prefix("a=control:streamid="))
        .expect("SDP control attribute")
        .trim()
        .to_string()
}

/// Annex-B buffer from NAL units built as (type, length) pairs.
fn annex_b_frame(nals: &[(u8, usize)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for &(nal_type, len) in nals {
        buf.extend_from_slice(&[0, 0, 0, 1]);
        buf.push(nal_type << 1);
        buf.push(0x01);
        buf.resize(buf.len() + len - 2, 0xAA);
    }
    buf
}

fn recv_rtp(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 2048];
    let (n, _) = socket.recv_from(&mut buf).expect("RTP packet");
    buf.truncate(n);
    buf
}

fn nal_type_of(packet: &[u8]) -> u8 {
    (packet[12] >> 1) & 0x3F
}

#[test]
fn full_handshake_and_udp_delivery() {
    let server = start_server(18554, |_| {});
    server.add_stream("live");

    let mut stream = connect(18554);
    let base_url = "rtsp://127.0.0.1:18554/live";

    // OPTIONS
    let resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_url),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
    assert!(resp.contains("Public:"));
    assert!(resp.contains("Server: hevc-rtsp/0.1"));

    // DESCRIBE
    let resp = rtsp_request(
        &mut stream,
        &format!(
            "DESCRIBE {} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n",
            base_url
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
    assert!(resp.contains("Content-Type: application/sdp"));
    assert!(resp.contains("Content-Base: rtsp://127.0.0.1:18554/live/"));
    assert!(resp.contains("m=video"));
    assert!(resp.contains("a=rtpmap:96 H265/90000"));
    let session_id = session_id_from_sdp(&resp);
    assert_eq!(session_id.len(), 32);

    // SETUP over UDP, receiving on a socket we own.
    let rtp_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    rtp_socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let client_port = rtp_socket.local_addr().unwrap().port();

    let resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {}/streamid={} RTSP/1.0\r\nCSeq: 3\r\n\
             Transport: RTP/AVP/UDP;unicast;client_port={}-{}\r\n\r\n",
            base_url,
            session_id,
            client_port,
            client_port + 1
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
    assert!(resp.contains(&format!("Session: {};timeout=60", session_id)));
    assert!(resp.contains("server_port="));

    // PLAY
    let resp = rtsp_request(
        &mut stream,
        &format!(
            "PLAY {} RTSP/1.0\r\nCSeq: 4\r\nSession: {}\r\n\r\n",
            base_url, session_id
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
    assert!(resp.contains("Range: npt=0.000-"));
    assert_eq!(server.session_count("live"), 1);

    // One buffer holding VPS + SPS + PPS + IRAP slice: exactly four RTP
    // packets, parameter sets first, marker only on the slice.
    let frame = annex_b_frame(&[(32, 25), (33, 40), (34, 7), (19, 800)]);
    server.push_frame("live", &frame, 3000).unwrap();

    let packets: Vec<Vec<u8>> = (0..4).map(|_| recv_rtp(&rtp_socket)).collect();

    let types: Vec<u8> = packets.iter().map(|p| nal_type_of(p)).collect();
    assert_eq!(types, vec![32, 33, 34, 19]);

    for pkt in &packets {
        assert_eq!(pkt[0] >> 6, 2, "RTP version");
        assert_eq!(pkt[1] & 0x7F, 96, "payload type");
        assert_eq!(&pkt[4..8], &3000u32.to_be_bytes(), "timestamp");
    }

    let seqs: Vec<u16> = packets
        .iter()
        .map(|p| u16::from_be_bytes([p[2], p[3]]))
        .collect();
    for pair in seqs.windows(2) {
        assert_eq!(pair[1], pair[0].wrapping_add(1), "consecutive sequences");
    }

    let markers: Vec<bool> = packets.iter().map(|p| p[1] & 0x80 != 0).collect();
    assert_eq!(markers, vec![false, false, false, true]);

    // TEARDOWN drops the session; the next push reaches nobody.
    let resp = rtsp_request(
        &mut stream,
        &format!(
            "TEARDOWN {} RTSP/1.0\r\nCSeq: 5\r\nSession: {}\r\n\r\n",
            base_url, session_id
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
    assert_eq!(server.session_count("live"), 0);

    server.push_frame("live", &frame, 6000).unwrap();
    let mut buf = [0u8; 2048];
    assert!(
        rtp_socket.recv_from(&mut buf).is_err(),
        "no packets after teardown"
    );

    // The control connection outlives the session.
    let resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS {} RTSP/1.0\r\nCSeq: 6\r\n\r\n", base_url),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);

    let mut server = server;
    server.stop();
}

#[test]
fn describe_unknown_or_removed_path_is_404() {
    let server = start_server(18555, |_| {});
    server.add_stream("live");

    let mut stream = connect(18555);
    let resp = rtsp_request(
        &mut stream,
        "DESCRIBE rtsp://127.0.0.1:18555/nope RTSP/1.0\r\nCSeq: 1\r\n\r\n",
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 404 Not Found"), "{}", resp);
    assert_eq!(server.total_session_count(), 0);

    server.remove_stream("live");
    let resp = rtsp_request(
        &mut stream,
        "DESCRIBE rtsp://127.0.0.1:18555/live RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 404 Not Found"), "{}", resp);
    assert!(server.push_frame("live", &[0, 0, 0, 1, 0x02, 0x01], 0).is_err());

    let mut server = server;
    server.stop();
}

/// DESCRIBE / SETUP / PLAY over UDP; returns the control stream and the
/// client's RTP receive socket.
fn join_as_viewer(port: u16, path: &str) -> (TcpStream, UdpSocket, String) {
    let mut stream = connect(port);
    let base_url = format!("rtsp://127.0.0.1:{}/{}", port, path);

    let resp = rtsp_request(
        &mut stream,
        &format!("DESCRIBE {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_url),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
    let session_id = session_id_from_sdp(&resp);

    let rtp_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    rtp_socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let client_port = rtp_socket.local_addr().unwrap().port();

    let resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {}/streamid={} RTSP/1.0\r\nCSeq: 2\r\n\
             Transport: RTP/AVP/UDP;unicast;client_port={}-{}\r\n\r\n",
            base_url,
            session_id,
            client_port,
            client_port + 1
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);

    let resp = rtsp_request(
        &mut stream,
        &format!(
            "PLAY {} RTSP/1.0\r\nCSeq: 3\r\nSession: {}\r\n\r\n",
            base_url, session_id
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);

    (stream, rtp_socket, session_id)
}

#[test]
fn admission_reject_keeps_first_viewer() {
    let server = start_server(18556, |c| {
        c.max_clients_per_path = 1;
        c.overflow_strategy = OverflowStrategy::Reject;
    });
    server.add_stream("live");

    let (_stream_a, socket_a, _) = join_as_viewer(18556, "live");

    let mut stream_b = connect(18556);
    let resp = rtsp_request(
        &mut stream_b,
        "DESCRIBE rtsp://127.0.0.1:18556/live RTSP/1.0\r\nCSeq: 1\r\n\r\n",
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 404 Not Found"), "{}", resp);

    // The first viewer keeps receiving.
    let frame = annex_b_frame(&[(1, 100)]);
    server.push_frame("live", &frame, 3000).unwrap();
    let pkt = recv_rtp(&socket_a);
    assert_eq!(nal_type_of(&pkt), 1);

    let mut server = server;
    server.stop();
}

#[test]
fn admission_kick_oldest_closes_first_viewer() {
    let server = start_server(18557, |c| {
        c.max_clients_per_path = 1;
        c.overflow_strategy = OverflowStrategy::KickOldest;
    });
    server.add_stream("live");

    let (mut stream_a, socket_a, _) = join_as_viewer(18557, "live");

    // B's DESCRIBE succeeds and flags A for close.
    let mut stream_b = connect(18557);
    let resp = rtsp_request(
        &mut stream_b,
        "DESCRIBE rtsp://127.0.0.1:18557/live RTSP/1.0\r\nCSeq: 1\r\n\r\n",
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);

    // The next fan-out cycle still delivers to A, then shuts its control
    // socket.
    let frame = annex_b_frame(&[(1, 100)]);
    server.push_frame("live", &frame, 3000).unwrap();
    let pkt = recv_rtp(&socket_a);
    assert_eq!(nal_type_of(&pkt), 1);

    let mut buf = [0u8; 64];
    match stream_a.read(&mut buf) {
        Ok(0) => {}  // clean EOF
        Ok(n) => panic!("expected EOF on kicked control socket, got {} bytes", n),
        Err(_) => {} // reset also acceptable
    }

    let mut server = server;
    server.stop();
}

#[test]
fn setup_tcp_rejected_when_disabled() {
    let server = start_server(18558, |c| {
        c.tcp_enable = false;
    });
    server.add_stream("live");

    let mut stream = connect(18558);
    let resp = rtsp_request(
        &mut stream,
        "DESCRIBE rtsp://127.0.0.1:18558/live RTSP/1.0\r\nCSeq: 1\r\n\r\n",
    )
    .unwrap();
    let session_id = session_id_from_sdp(&resp);

    let resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP rtsp://127.0.0.1:18558/live/streamid={} RTSP/1.0\r\nCSeq: 2\r\n\
             Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
            session_id
        ),
    )
    .unwrap();
    assert!(
        resp.starts_with("RTSP/1.0 405 Method Not Allowed"),
        "{}",
        resp
    );

    let mut server = server;
    server.stop();
}

#[test]
fn interleaved_delivery_frames_packets_on_channel_zero() {
    let server = start_server(18559, |_| {});
    server.add_stream("live");

    let mut stream = connect(18559);
    let base_url = "rtsp://127.0.0.1:18559/live";

    let resp = rtsp_request(
        &mut stream,
        &format!("DESCRIBE {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_url),
    )
    .unwrap();
    let session_id = session_id_from_sdp(&resp);

    let resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {}/streamid={} RTSP/1.0\r\nCSeq: 2\r\n\
             Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
            base_url, session_id
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
    assert!(resp.contains("Transport: RTP/AVP/TCP;interleaved=0-1"));

    let resp = rtsp_request(
        &mut stream,
        &format!(
            "PLAY {} RTSP/1.0\r\nCSeq: 3\r\nSession: {}\r\n\r\n",
            base_url, session_id
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);

    let frame = annex_b_frame(&[(1, 60)]);
    server.push_frame("live", &frame, 3000).unwrap();

    // `$ <channel> <length:u16-be>` followed by the RTP packet.
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    assert_eq!(header[0], b'$');
    assert_eq!(header[1], 0, "RTP rides channel 0");
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;
    assert_eq!(length, 12 + 60);

    let mut packet = vec![0u8; length];
    stream.read_exact(&mut packet).unwrap();
    assert_eq!(packet[0] >> 6, 2);
    assert_eq!(packet[1] & 0x7F, 96);
    assert_eq!(nal_type_of(&packet), 1);
    assert_eq!(packet[1] & 0x80, 0x80, "sole NAL carries the marker");

    let mut server = server;
    server.stop();
}

#[test]
fn announce_body_does_not_desync_the_request_loop() {
    let server = start_server(18560, |_| {});
    server.add_stream("live");

    let mut stream = connect(18560);
    let body = "v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\n";
    let resp = rtsp_request(
        &mut stream,
        &format!(
            "ANNOUNCE rtsp://127.0.0.1:18560/live RTSP/1.0\r\nCSeq: 1\r\n\
             Content-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);

    // The body was drained, so the next request parses cleanly.
    let resp = rtsp_request(
        &mut stream,
        "OPTIONS rtsp://127.0.0.1:18560/live RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .unwrap();
    assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);

    let mut server = server;
    server.stop();
}

#[test]
fn disconnect_cleans_up_described_sessions() {
    let server = start_server(18561, |_| {});
    server.add_stream("live");

    {
        let mut stream = connect(18561);
        let resp = rtsp_request(
            &mut stream,
            "DESCRIBE rtsp://127.0.0.1:18561/live RTSP/1.0\r\nCSeq: 1\r\n\r\n",
        )
        .unwrap();
        assert!(resp.starts_with("RTSP/1.0 200 OK"), "{}", resp);
        assert_eq!(server.session_count("live"), 1);
    } // connection dropped here

    // The connection thread notices the close and removes the session.
    let mut waited = Duration::ZERO;
    while server.session_count("live") > 0 && waited < Duration::from_secs(2) {
        std::thread::sleep(Duration::from_millis(20));
        waited += Duration::from_millis(20);
    }
    assert_eq!(server.session_count("live"), 0);

    let mut server = server;
    server.stop();
}
