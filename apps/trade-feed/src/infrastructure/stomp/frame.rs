//! STOMP Frame Codec
//!
//! Encoding and decoding of STOMP 1.2 frames carried in WebSocket text
//! messages.
//!
//! # Frame Format
//!
//! ```text
//! COMMAND EOL
//! header:value EOL
//! ...
//! EOL
//! body NUL
//! ```
//!
//! `EOL` is `\n` or `\r\n`. A text message holding nothing but EOLs is a
//! heart-beat. Header values are escaped (`\\`, `\n`, `\r`, `\c`) in every
//! frame except `CONNECT` and `CONNECTED`. When `content-length` is present
//! the body is exactly that many bytes and may contain NUL.

use std::fmt;
use std::str::FromStr;

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The text ended before the frame was complete.
    #[error("truncated frame")]
    Truncated,

    /// The command line is not a STOMP command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A header line has no `:`.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    /// A header contains an undefined escape sequence.
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    /// `content-length` is not a byte count.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// The byte after a `content-length` body is not NUL.
    #[error("body does not end with NUL")]
    MissingNull,

    /// The body is not valid UTF-8.
    #[error("body is not valid UTF-8")]
    InvalidUtf8,
}

// =============================================================================
// Command
// =============================================================================

/// STOMP 1.2 commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Client handshake (alternate name).
    Stomp,
    /// Server handshake reply.
    Connected,
    /// Client publish.
    Send,
    /// Client subscribe.
    Subscribe,
    /// Client unsubscribe.
    Unsubscribe,
    /// Client acknowledge.
    Ack,
    /// Client negative acknowledge.
    Nack,
    /// Client transaction begin.
    Begin,
    /// Client transaction commit.
    Commit,
    /// Client transaction abort.
    Abort,
    /// Client goodbye.
    Disconnect,
    /// Server delivery.
    Message,
    /// Server receipt.
    Receipt,
    /// Server error.
    Error,
}

impl Command {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Handshake frames carry raw header values.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Frame
// =============================================================================

/// A STOMP frame.
///
/// Headers keep their wire order. When a header repeats, the first
/// occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Vec<(String, String)>,
    body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// The frame command.
    #[must_use]
    pub const fn command(&self) -> Command {
        self.command
    }

    /// First value of header `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All headers in wire order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// `SUBSCRIBE` frame.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// `UNSUBSCRIBE` frame.
    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    /// `DISCONNECT` frame.
    #[must_use]
    pub const fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }
}

/// One unit of inbound traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A bare EOL heart-beat.
    Heartbeat,
    /// A complete frame.
    Frame(Frame),
}

// =============================================================================
// Codec
// =============================================================================

/// Heart-beat payload.
pub const HEARTBEAT: &str = "\n";

/// STOMP text codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct StompCodec;

impl StompCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a frame. A non-empty body gets a `content-length` header
    /// unless one is already set.
    #[must_use]
    pub fn encode(&self, frame: &Frame) -> String {
        let mut out = String::with_capacity(64 + frame.body.len());
        out.push_str(frame.command.as_str());
        out.push('\n');

        let escape = frame.command.escapes_headers();
        for (name, value) in &frame.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !frame.body.is_empty() && frame.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&frame.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&frame.body);
        out.push('\0');
        out
    }

    /// Decode one WebSocket text message.
    ///
    /// A message of only EOLs is one heart-beat. Otherwise every frame in
    /// the message is returned in order; EOLs between frames are padding.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if any frame in the message is malformed.
    pub fn decode(&self, text: &str) -> Result<Vec<Inbound>, FrameError> {
        self.frames(text).collect()
    }

    /// Decode one WebSocket text message frame by frame.
    ///
    /// A malformed frame yields its error and decoding resumes after the
    /// next NUL, so later frames in the same message still come through.
    #[must_use]
    pub fn frames<'a>(&self, text: &'a str) -> Frames<'a> {
        Frames {
            cursor: Cursor { text, pos: 0 },
            heartbeat: text.bytes().all(|b| b == b'\n' || b == b'\r'),
        }
    }
}

/// Iterator over the frames of one text message. See [`StompCodec::frames`].
#[derive(Debug)]
pub struct Frames<'a> {
    cursor: Cursor<'a>,
    heartbeat: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Inbound, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.heartbeat {
            self.heartbeat = false;
            self.cursor.pos = self.cursor.text.len();
            return Some(Ok(Inbound::Heartbeat));
        }

        self.cursor.skip_eols();
        if self.cursor.at_end() {
            return None;
        }
        let start = self.cursor.pos;
        match self.cursor.frame() {
            Ok(frame) => Some(Ok(Inbound::Frame(frame))),
            Err(e) => {
                self.cursor.resync(start);
                Some(Err(e))
            }
        }
    }
}

#[derive(Debug)]
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Skip past the first NUL at or after `start`.
    fn resync(&mut self, start: usize) {
        self.pos = self.text[start..]
            .find('\0')
            .map_or(self.text.len(), |end| start + end + 1);
    }

    fn skip_eols(&mut self) {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && matches!(bytes[self.pos], b'\n' | b'\r') {
            self.pos += 1;
        }
    }

    fn line(&mut self) -> Result<&'a str, FrameError> {
        let rest = &self.text[self.pos..];
        let end = rest.find('\n').ok_or(FrameError::Truncated)?;
        self.pos += end + 1;
        let line = &rest[..end];
        Ok(line.strip_suffix('\r').unwrap_or(line))
    }

    fn frame(&mut self) -> Result<Frame, FrameError> {
        let command: Command = self.line()?.parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = self.line()?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let frame = Frame {
            command,
            headers,
            body: String::new(),
        };
        let body = match frame.get("content-length") {
            Some(raw) => {
                let length: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
                self.sized_body(length)?
            }
            None => self.terminated_body()?,
        };

        Ok(frame.with_body(body))
    }

    fn sized_body(&mut self, length: usize) -> Result<&'a str, FrameError> {
        let bytes = self.text.as_bytes();
        let end = self.pos.checked_add(length).ok_or(FrameError::Truncated)?;
        if end >= bytes.len() {
            return Err(FrameError::Truncated);
        }
        if bytes[end] != 0 {
            return Err(FrameError::MissingNull);
        }
        let body = self.text.get(self.pos..end).ok_or(FrameError::InvalidUtf8)?;
        self.pos = end + 1;
        Ok(body)
    }

    fn terminated_body(&mut self) -> Result<&'a str, FrameError> {
        let rest = &self.text[self.pos..];
        let end = rest.find('\0').ok_or(FrameError::Truncated)?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}
