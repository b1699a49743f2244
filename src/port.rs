// src/port.rs
// Command/response channel to a single instrument.
//
// Instruments speak either line-terminated text (SCPI and friends) or
// IEEE 488.2 definite-length binary blocks (`#<n><length><payload>`).
// `StreamPort` implements both over anything that is `Read + Write`, so the
// same code drives a serial device, a raw TCP socket, or an in-memory script.
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use log::{debug, trace};
use serialport::SerialPort;
use crate::error::LabError;
/// Byte-oriented command channel owned by exactly one instrument handle.
pub trait InstrumentPort {
    /// Human readable name used in errors and logs.
    fn name(&self) -> &str;
    /// Send one command; the write terminator is appended.
    fn write(&mut self, command: &str) -> Result<(), LabError>;
    /// Read up to the next read terminator, which is stripped along with a trailing `\r`.
    fn read_line(&mut self) -> Result<String, LabError>;
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, LabError>;
    fn query(&mut self, command: &str) -> Result<String, LabError> {
        self.write(command)?;
        Ok(self.read_line()?.trim().to_string())
    }
    fn query_binary(&mut self, command: &str) -> Result<Vec<u8>, LabError> {
        self.write(command)?;
        read_ieee_block(self)
    }
}
/// Parse a number out of a query response, reporting the port on failure.
pub fn parse_number<P: InstrumentPort + ?Sized>(port: &P, text: &str) -> Result<f64, LabError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| LabError::protocol(port.name(), format!("expected a number, got {text:?}")))
}
fn read_ieee_block<P: InstrumentPort + ?Sized>(port: &mut P) -> Result<Vec<u8>, LabError> {
    let header = port.read_exact(2)?;
    if header[0] != b'#' {
        return Err(LabError::protocol(
            port.name(),
            format!("binary block starts with {:?}, expected '#'", header[0] as char),
        ));
    }
    let digits = match (header[1] as char).to_digit(10) {
        Some(d) if d > 0 => d as usize,
        _ => {
            return Err(LabError::protocol(
                port.name(),
                "indefinite-length binary blocks are not supported",
            ))
        }
    };
    let length_field = port.read_exact(digits)?;
    let length = std::str::from_utf8(&length_field)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| LabError::protocol(port.name(), "bad binary block length"))?;
    let payload = port.read_exact(length)?;
    // The block is followed by the regular line terminator.
    port.read_line()?;
    trace!("{}: received {} byte block", port.name(), payload.len());
    Ok(payload)
}
/// [`InstrumentPort`] over any byte stream.
pub struct StreamPort<T> {
    name: String,
    stream: T,
    write_termination: String,
    read_termination: u8,
    pending: Vec<u8>,
}
impl<T: Read + Write> StreamPort<T> {
    pub fn new(name: impl Into<String>, stream: T) -> Self {
        Self {
            name: name.into(),
            stream,
            write_termination: "\n".to_string(),
            read_termination: b'\n',
            pending: Vec::new(),
        }
    }
    pub fn with_write_termination(mut self, termination: &str) -> Self {
        self.write_termination = termination.to_string();
        self
    }
    pub fn with_read_termination(mut self, termination: u8) -> Self {
        self.read_termination = termination;
        self
    }
    pub fn stream(&self) -> &T {
        &self.stream
    }
    pub fn into_stream(self) -> T {
        self.stream
    }
    fn io_error(&self, source: io::Error) -> LabError {
        LabError::Communication {
            instrument: self.name.clone(),
            source,
        }
    }
    fn fill(&mut self) -> Result<(), LabError> {
        let mut chunk = [0u8; 4096];
        let n = match self.stream.read(&mut chunk) {
            Ok(0) => {
                return Err(self.io_error(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )))
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(self.io_error(e)),
        };
        self.pending.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}
impl StreamPort<Box<dyn SerialPort>> {
    /// Open a serial device; the port is closed when the returned value is dropped.
    pub fn serial(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, LabError> {
        debug!("opening serial port {path} at {baud_rate} baud");
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| LabError::Communication {
                instrument: path.to_string(),
                source: e.into(),
            })?;
        Ok(Self::new(path, port))
    }
}
impl StreamPort<TcpStream> {
    /// Connect to a raw socket endpoint such as `scope:5555`.
    pub fn tcp(address: &str, timeout: Duration) -> Result<Self, LabError> {
        let comm = |source: io::Error| LabError::Communication {
            instrument: address.to_string(),
            source,
        };
        debug!("connecting to {address}");
        let socket_addr = address
            .to_socket_addrs()
            .map_err(comm)?
            .next()
            .ok_or_else(|| {
                comm(io::Error::new(
                    io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ))
            })?;
        let stream = TcpStream::connect_timeout(&socket_addr, timeout).map_err(comm)?;
        // Small command packets must not wait for Nagle coalescing.
        stream.set_nodelay(true).map_err(comm)?;
        stream.set_read_timeout(Some(timeout)).map_err(comm)?;
        stream.set_write_timeout(Some(timeout)).map_err(comm)?;
        Ok(Self::new(address, stream))
    }
}
impl<T: Read + Write> InstrumentPort for StreamPort<T> {
    fn name(&self) -> &str {
        &self.name
    }
    fn write(&mut self, command: &str) -> Result<(), LabError> {
        trace!("{} <- {:?}", self.name, command);
        let mut bytes = Vec::with_capacity(command.len() + self.write_termination.len());
        bytes.extend_from_slice(command.as_bytes());
        bytes.extend_from_slice(self.write_termination.as_bytes());
        self.stream
            .write_all(&bytes)
            .and_then(|_| self.stream.flush())
            .map_err(|e| self.io_error(e))
    }
    fn read_line(&mut self) -> Result<String, LabError> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == self.read_termination) {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let mut line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
                if line.ends_with('\r') {
                    line.pop();
                }
                trace!("{} -> {:?}", self.name, line);
                return Ok(line);
            }
            self.fill()?;
        }
    }
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, LabError> {
        while self.pending.len() < len {
            self.fill()?;
        }
        Ok(self.pending.drain(..len).collect())
    }
}
/// In-memory stream that replays canned instrument output and records what was sent.
///
/// Reading past the end of the script fails with `TimedOut`, like a real port
/// whose instrument stopped answering.
#[derive(Default)]
pub struct ScriptedStream {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
}
impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.incoming.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no scripted response"));
        }
        let n = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
pub type ScriptedPort = StreamPort<ScriptedStream>;
impl StreamPort<ScriptedStream> {
    pub fn scripted(name: impl Into<String>) -> Self {
        Self::new(name, ScriptedStream::default())
    }
    /// Queue a text response, terminated with the read terminator.
    pub fn reply(mut self, text: &str) -> Self {
        self.stream.incoming.extend(text.as_bytes());
        self.stream.incoming.push_back(self.read_termination);
        self
    }
    /// Queue an IEEE 488.2 definite-length block.
    pub fn reply_block(mut self, payload: &[u8]) -> Self {
        let header = format!("#9{:09}", payload.len());
        self.stream.incoming.extend(header.as_bytes());
        self.stream.incoming.extend(payload);
        self.stream.incoming.push_back(self.read_termination);
        self
    }
    pub fn reply_raw(mut self, bytes: &[u8]) -> Self {
        self.stream.incoming.extend(bytes);
        self
    }
    /// Commands written so far, split on the write terminator.
    pub fn sent(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.stream.written)
            .split(self.write_termination.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn query_strips_terminators() {
        let mut port = ScriptedPort::scripted("dut").reply("RIGOL TECHNOLOGIES,DS1054Z\r");
        let idn = port.query("*IDN?").unwrap();
        assert_eq!(idn, "RIGOL TECHNOLOGIES,DS1054Z");
        assert_eq!(port.sent(), vec!["*IDN?"]);
    }
    #[test]
    fn binary_block_is_unwrapped() {
        let mut port = ScriptedPort::scripted("dut")
            .reply_block(&[1, 2, 3, 10, 255])
            .reply("next");
        let data = port.query_binary("WAV:DATA?").unwrap();
        assert_eq!(data, vec![1, 2, 3, 10, 255]);
        // Trailing terminator is consumed, the following line is intact.
        assert_eq!(port.read_line().unwrap(), "next");
    }
    #[test]
    fn short_length_field_block() {
        let mut port = ScriptedPort::scripted("dut").reply_raw(b"#14abcd\n");
        assert_eq!(port.query_binary("X?").unwrap(), b"abcd".to_vec());
    }
    #[test]
    fn malformed_block_header_is_protocol_error() {
        let mut port = ScriptedPort::scripted("dut").reply("garbage");
        let err = port.query_binary("WAV:DATA?").unwrap_err();
        assert!(matches!(err, LabError::Protocol { .. }));
    }
    #[test]
    fn missing_response_is_communication_error() {
        let mut port = ScriptedPort::scripted("dut");
        let err = port.query("*IDN?").unwrap_err();
        match err {
            LabError::Communication { instrument, source } => {
                assert_eq!(instrument, "dut");
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
    #[test]
    fn custom_terminators() {
        let mut port = ScriptedPort::scripted("gen")
            .with_write_termination("\r\n")
            .reply(":ok");
        assert_eq!(port.query(":w23=100000,0.").unwrap(), ":ok");
        assert_eq!(port.sent(), vec![":w23=100000,0."]);
    }
}
