use crate::types::constants::{JSON_CONTENT_TYPE, STOMP_VERSION, stomp_commands, stomp_headers};
use crate::types::{ChatError, Result};

/// STOMP 1.2 commands used by the chat protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn parse(s: &str) -> Option<Self> {
        let command = match s {
            stomp_commands::CONNECT => Self::Connect,
            stomp_commands::STOMP => Self::Stomp,
            stomp_commands::CONNECTED => Self::Connected,
            stomp_commands::SEND => Self::Send,
            stomp_commands::SUBSCRIBE => Self::Subscribe,
            stomp_commands::UNSUBSCRIBE => Self::Unsubscribe,
            stomp_commands::MESSAGE => Self::Message,
            stomp_commands::RECEIPT => Self::Receipt,
            stomp_commands::ERROR => Self::Error,
            stomp_commands::DISCONNECT => Self::Disconnect,
            _ => return None,
        };
        Some(command)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => stomp_commands::CONNECT,
            Self::Stomp => stomp_commands::STOMP,
            Self::Connected => stomp_commands::CONNECTED,
            Self::Send => stomp_commands::SEND,
            Self::Subscribe => stomp_commands::SUBSCRIBE,
            Self::Unsubscribe => stomp_commands::UNSUBSCRIBE,
            Self::Message => stomp_commands::MESSAGE,
            Self::Receipt => stomp_commands::RECEIPT,
            Self::Error => stomp_commands::ERROR,
            Self::Disconnect => stomp_commands::DISCONNECT,
        }
    }

    /// CONNECT/CONNECTED headers are sent verbatim for 1.0 compatibility
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup; on repeated headers the first one wins
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Adds `Authorization: Bearer <token>` when a token is available
    pub fn with_bearer(self, token: Option<&str>) -> Self {
        match token {
            Some(token) => {
                self.with_header(stomp_headers::AUTHORIZATION, format!("Bearer {}", token))
            }
            None => self,
        }
    }

    pub fn connect(host: &str, heart_beat: (u64, u64), token: Option<&str>) -> Self {
        Self::new(Command::Connect)
            .with_header(stomp_headers::ACCEPT_VERSION, STOMP_VERSION)
            .with_header(stomp_headers::HOST, host)
            .with_header(
                stomp_headers::HEART_BEAT,
                format!("{},{}", heart_beat.0, heart_beat.1),
            )
            .with_bearer(token)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header(stomp_headers::ID, id)
            .with_header(stomp_headers::DESTINATION, destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header(stomp_headers::ID, id)
    }

    pub fn send(destination: &str, headers: &[(String, String)], body: impl Into<String>) -> Self {
        let mut frame =
            Self::new(Command::Send).with_header(stomp_headers::DESTINATION, destination);
        frame.headers.extend(headers.iter().cloned());
        frame.with_body(body)
    }

    /// Headers every JSON publish carries besides the bearer token
    pub fn json_headers() -> Vec<(String, String)> {
        vec![(
            stomp_headers::CONTENT_TYPE.to_string(),
            JSON_CONTENT_TYPE.to_string(),
        )]
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header(stomp_headers::CONTENT_LENGTH).is_none() {
            out.push_str(stomp_headers::CONTENT_LENGTH);
            out.push(':');
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// One unit of inbound traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat,
    Frame(Frame),
}

/// Decodes every frame in a WebSocket text message.
///
/// Servers may batch frames and interleave heart-beat EOLs between them.
pub fn decode(text: &str) -> Result<Vec<Inbound>> {
    let mut out = Vec::new();
    let mut rest = text;

    loop {
        let trimmed = rest.trim_start_matches(['\r', '\n']);
        if trimmed.len() != rest.len() {
            out.push(Inbound::Heartbeat);
        }
        rest = trimmed;
        if rest.is_empty() {
            break;
        }

        let (frame, remaining) = decode_one(rest)?;
        out.push(Inbound::Frame(frame));
        rest = remaining;
    }

    Ok(out)
}

fn decode_one(input: &str) -> Result<(Frame, &str)> {
    let (command_line, mut rest) = split_line(input)
        .ok_or_else(|| ChatError::Frame("missing command line".to_string()))?;
    let command = Command::parse(command_line)
        .ok_or_else(|| ChatError::Frame(format!("unknown command '{}'", command_line)))?;

    let unescape = command.escapes_headers();
    let mut headers = Vec::new();
    loop {
        let (line, remaining) =
            split_line(rest).ok_or_else(|| ChatError::Frame("unterminated headers".to_string()))?;
        rest = remaining;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ChatError::Frame(format!("malformed header '{}'", line)))?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == stomp_headers::CONTENT_LENGTH)
        .map(|(_, v)| {
            v.parse::<usize>()
                .map_err(|_| ChatError::Frame(format!("bad content-length '{}'", v)))
        })
        .transpose()?;

    let body_len = match content_length {
        Some(len) => len,
        None => rest
            .find('\0')
            .ok_or_else(|| ChatError::Frame("missing NUL terminator".to_string()))?,
    };
    let body = rest
        .get(..body_len)
        .ok_or_else(|| ChatError::Frame("body shorter than content-length".to_string()))?;
    let after = &rest[body_len..];
    let after = after
        .strip_prefix('\0')
        .ok_or_else(|| ChatError::Frame("missing NUL terminator".to_string()))?;

    let frame = Frame {
        command,
        headers,
        body: body.to_string(),
    };
    Ok((frame, after))
}

fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = &input[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[idx + 1..]))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
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
            other => {
                return Err(ChatError::Frame(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}
