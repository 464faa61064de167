use crate::error::{ParseErrorKind, RtspError};

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URL SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is exact-case, matching the header names clients commonly
/// emit (`CSeq`, `Transport`, `Session`, `Require`, `User-Agent`,
/// `Content-Length`).
///
/// The session id rides in the URL as `streamid=<id>` rather than in the
/// `Session` header: DESCRIBE hands out an SDP whose control attribute is
/// `streamid=<id>`, and the client appends it to the control URL on SETUP.
/// This lets SETUP resolve a session without a prior header exchange.
#[derive(Debug)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: String,
    /// Request-URL (e.g. `rtsp://host:port/live/streamid=<id>`).
    pub url: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs, names stored as received.
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    /// Parse an RTSP request from its text representation.
    ///
    /// Expects a complete head: request line, headers, and trailing blank
    /// line. Any body bytes are read (and discarded) by the connection loop
    /// using [`content_length`](Self::content_length), never parsed here.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let url = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        Ok(RtspRequest {
            method,
            url,
            version,
            headers,
        })
    }

    /// Look up a header value by exact name.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The CSeq header value, which numbers and orders RTSP
    /// request/response pairs (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// The session id embedded in the URL as `streamid=<id>`, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.url
            .find("streamid=")
            .map(|idx| &self.url[idx + "streamid=".len()..])
    }

    /// Declared body length; 0 when absent or unparsable.
    pub fn content_length(&self) -> usize {
        self.get_header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Extract the stream path from an RTSP URL by stripping the scheme and
/// authority.
///
/// `rtsp://host:8554/live` → `live`
/// `rtsp://host:8554/cam/front` → `cam/front`
/// `live` → `live`
pub fn extract_stream_path(url: &str) -> &str {
    let mut rest = url;
    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
        match rest.find('/') {
            Some(slash) => rest = &rest[slash + 1..],
            None => rest = "",
        }
    }
    rest
}
