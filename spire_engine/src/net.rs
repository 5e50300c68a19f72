//! The client capability: a line-oriented transport the session drives.
//!
//! Sessions only ever see this trait, so the same loop serves a TCP socket,
//! a scripted test double, or any future transport that can read and write
//! lines. Reads carry a timeout so the session can notice idle players and
//! kick requests without a dedicated watchdog.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// One poll of the inbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line, terminator stripped.
    Line(String),
    /// The read timed out; the connection is still up.
    Idle,
    /// The peer went away.
    Disconnected,
}

pub trait Client: Send + Sync {
    fn read_line(&self) -> io::Result<LineEvent>;
    fn write_line(&self, line: &str) -> io::Result<()>;
    fn close(&self);
    fn remote_addr(&self) -> String;
}

/// A TCP transport: UTF-8 lines, CR/LF/CRLF tolerated inbound, `\n`
/// terminated outbound.
pub struct TcpClient {
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<TcpStream>,
    peer: String,
}

impl TcpClient {
    /// Poll granularity for reads; the session layers its own idle timeout
    /// on top of this.
    const READ_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "<unknown>".to_string(), |addr| addr.to_string());
        stream.set_read_timeout(Some(Self::READ_TIMEOUT))?;
        stream.set_nodelay(true).ok();
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(stream),
            peer,
        })
    }
}

impl Client for TcpClient {
    fn read_line(&self) -> io::Result<LineEvent> {
        let mut buf = String::new();
        let result = self.reader.lock().read_line(&mut buf);
        match result {
            Ok(0) => Ok(LineEvent::Disconnected),
            Ok(_) => {
                while buf.ends_with('\n') || buf.ends_with('\r') {
                    buf.pop();
                }
                Ok(LineEvent::Line(buf))
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(LineEvent::Idle)
            }
            Err(err) => Err(err),
        }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stream = self.writer.lock();
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()
    }

    fn close(&self) {
        let _ = self.writer.lock().shutdown(Shutdown::Both);
    }

    fn remote_addr(&self) -> String {
        self.peer.clone()
    }
}

/// A scripted transport: feed it input lines, read back what was written.
/// Drives the session loop in tests without a socket.
pub struct ScriptedClient {
    inputs: Mutex<VecDeque<String>>,
    outputs: Mutex<Vec<String>>,
    closed: Mutex<bool>,
}

impl ScriptedClient {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            inputs: Mutex::new(lines.iter().map(ToString::to_string).collect()),
            outputs: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    pub fn written(&self) -> Vec<String> {
        self.outputs.lock().clone()
    }

    pub fn was_closed(&self) -> bool {
        *self.closed.lock()
    }

    pub fn push_input(&self, line: &str) {
        self.inputs.lock().push_back(line.to_string());
    }
}

impl Client for ScriptedClient {
    fn read_line(&self) -> io::Result<LineEvent> {
        if *self.closed.lock() {
            return Ok(LineEvent::Disconnected);
        }
        match self.inputs.lock().pop_front() {
            Some(line) => Ok(LineEvent::Line(line)),
            // Script exhausted: behave like a vanished peer.
            None => Ok(LineEvent::Disconnected),
        }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        self.outputs.lock().push(line.to_string());
        Ok(())
    }

    fn close(&self) {
        *self.closed.lock() = true;
    }

    fn remote_addr(&self) -> String {
        "script".to_string()
    }
}
