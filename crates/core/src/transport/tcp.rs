use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::protocol::MethodHandler;
use crate::protocol::RtspRequest;
use crate::server::ServerConfig;
use crate::session::SessionManager;
use crate::stream::StreamRegistry;

/// Frame an RTP packet for interleaved delivery on the control socket:
/// `$ <channel:u8> <length:u16-be>` followed by the packet (RFC 2326 §10.12).
pub fn interleaved_frame(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(b'$');
    frame.push(channel);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
pub fn accept_loop(
    listener: TcpListener,
    session_manager: SessionManager,
    registry: StreamRegistry,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let sm = session_manager.clone();
                let r = running.clone();
                let reg = registry.clone();
                let c = config.clone();
                thread::spawn(move || {
                    Connection::handle(stream, sm, reg, c, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP client connection with its own lifecycle.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    handler: MethodHandler,
    config: Arc<ServerConfig>,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        stream: TcpStream,
        session_manager: SessionManager,
        registry: StreamRegistry,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        let control_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let handler = MethodHandler::new(
            session_manager.clone(),
            registry,
            config.clone(),
            peer_addr,
            control_stream,
        );

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer: stream,
            handler,
            config,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.cleanup(&session_manager);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    ///
    /// Requests are read one at a time (no pipelining): header lines up to
    /// the blank CRLF, then any declared body is drained so it cannot be
    /// misread as the next request. A parse failure closes the connection
    /// without a response.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let mut request_text = String::new();
            loop {
                let mut line = String::new();
                match self.reader.read_line(&mut line) {
                    Ok(0) => return "connection closed by client",
                    Ok(_) => {
                        request_text.push_str(&line);
                        if line == "\r\n" || line == "\n" {
                            break;
                        }
                    }
                    Err(_) => return "read error",
                }
            }

            if request_text.trim().is_empty() {
                continue;
            }

            if self.config.protocol_log {
                tracing::debug!(peer = %self.peer_addr, "received request:\n{}", request_text);
            }

            let request = match RtspRequest::parse(&request_text) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "malformed request");
                    return "malformed request";
                }
            };

            if self.drain_body(request.content_length()).is_err() {
                return "read error";
            }

            tracing::debug!(
                peer = %self.peer_addr,
                method = %request.method,
                url = %request.url,
                "request"
            );

            let response = match self.handler.handle(&request) {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "protocol error");
                    return "protocol error";
                }
            };

            let serialized = response.serialize();
            if self.config.protocol_log {
                tracing::debug!(peer = %self.peer_addr, "sending response:\n{}", serialized);
            }

            if self.writer.write_all(serialized.as_bytes()).is_err() {
                return "write error";
            }
        }

        "server shutting down"
    }

    /// Read and discard a declared request body (ANNOUNCE SDP and the like).
    fn drain_body(&mut self, length: usize) -> std::io::Result<()> {
        if length == 0 {
            return Ok(());
        }
        let mut body = vec![0u8; length];
        self.reader.read_exact(&mut body)?;
        tracing::trace!(peer = %self.peer_addr, length, "request body discarded");
        Ok(())
    }

    /// Close and unregister every session created by this connection.
    fn cleanup(&self, session_manager: &SessionManager) {
        let orphaned = self.handler.created_session_ids().to_vec();
        if !orphaned.is_empty() {
            for id in &orphaned {
                if let Some(session) = session_manager.get(id) {
                    session.close();
                }
            }
            let removed = session_manager.remove_many(&orphaned);
            tracing::info!(peer = %self.peer_addr, removed, "cleaned up sessions on disconnect");
        }
    }
}
