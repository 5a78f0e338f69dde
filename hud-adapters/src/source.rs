//! Concrete byte sources: serial port, UDP socket, playback file, memory
//! buffer and a capture tee that records everything read.

use anyhow::{Context, Result};
use hud_core::source::{ByteSource, SourceError, SourceKind};
use serial::{BaudRate, SerialPort, SystemPort};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::net::UdpSocket;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Serial read timeout
pub const SERIAL_TIMEOUT: Duration = Duration::from_secs(1);

fn timed_out(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

// ============================================================================
// Serial
// ============================================================================

/// 8N1 serial port with a one second read timeout
pub struct SerialSource {
    name: String,
    port: Option<SystemPort>,
}

impl SerialSource {
    pub fn open(path: &str, baud: usize) -> Result<Self> {
        let mut port = serial::open(path).with_context(|| format!("opening serial port {path}"))?;
        port.set_timeout(SERIAL_TIMEOUT)
            .with_context(|| format!("setting timeout on {path}"))?;
        port.reconfigure(&|settings| {
            settings.set_baud_rate(BaudRate::from_speed(baud))?;
            settings.set_char_size(serial::Bits8);
            settings.set_parity(serial::ParityNone);
            settings.set_stop_bits(serial::Stop1);
            settings.set_flow_control(serial::FlowNone);
            Ok(())
        })
        .with_context(|| format!("configuring {path} at {baud} baud"))?;

        info!(port = path, baud, "serial port open");
        Ok(Self {
            name: path.to_string(),
            port: Some(port),
        })
    }
}

impl ByteSource for SerialSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Serial
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| SourceError::Closed(self.name.clone()))?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if timed_out(&e) => Ok(0),
            Err(e) => Err(SourceError::io(&self.name, e)),
        }
    }

    fn seek_to_start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.name, "serial port closed");
        }
    }
}

// ============================================================================
// UDP
// ============================================================================

/// Non-blocking UDP listener. Datagrams are served out byte-wise.
pub struct UdpSource {
    name: String,
    socket: Option<UdpSocket>,
    datagram: Vec<u8>,
    pos: usize,
}

impl UdpSource {
    pub fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .with_context(|| format!("binding UDP port {port}"))?;
        socket
            .set_nonblocking(true)
            .context("setting UDP socket non-blocking")?;
        info!(port, "listening for UDP");
        Ok(Self {
            name: format!("udp:{port}"),
            socket: Some(socket),
            datagram: Vec::new(),
            pos: 0,
        })
    }

    pub fn local_port(&self) -> Option<u16> {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }
}

impl ByteSource for UdpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Udp
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if self.pos >= self.datagram.len() {
            let socket = self
                .socket
                .as_ref()
                .ok_or_else(|| SourceError::Closed(self.name.clone()))?;
            self.datagram.resize(65_535, 0);
            match socket.recv(&mut self.datagram) {
                Ok(n) => {
                    self.datagram.truncate(n);
                    self.pos = 0;
                }
                Err(e) if timed_out(&e) => {
                    self.datagram.clear();
                    self.pos = 0;
                    return Ok(0);
                }
                Err(e) => return Err(SourceError::io(&self.name, e)),
            }
        }
        let n = buf.len().min(self.datagram.len() - self.pos);
        buf[..n].copy_from_slice(&self.datagram[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek_to_start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn close(&mut self) {
        self.socket = None;
        self.datagram.clear();
        self.pos = 0;
    }
}

// ============================================================================
// Playback file
// ============================================================================

/// Capture file replayed in an endless loop
pub struct FileSource {
    name: String,
    file: Option<BufReader<File>>,
    rewound: bool,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening playback file {}", path.display()))?;
        info!(file = %path.display(), "playback file open");
        Ok(Self {
            name: path.display().to_string(),
            file: Some(BufReader::new(file)),
            rewound: false,
        })
    }
}

impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Playback
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SourceError::Closed(self.name.clone()))?;
        let n = file.read(buf).map_err(|e| SourceError::io(&self.name, e))?;
        if n == 0 && !buf.is_empty() {
            self.seek_to_start()?;
        }
        Ok(n)
    }

    fn seek_to_start(&mut self) -> Result<(), SourceError> {
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(0))
                .map_err(|e| SourceError::io(&self.name, e))?;
            self.rewound = true;
            debug!(file = %self.name, "playback rewound");
        }
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn take_rewound(&mut self) -> bool {
        std::mem::take(&mut self.rewound)
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory byte stream. Looping buffers behave like a playback file,
/// others like a live link that times out once drained.
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
    pos: usize,
    looping: bool,
    rewound: bool,
    closed: bool,
}

impl MemorySource {
    /// Drains once, then every read times out
    pub fn live(data: impl Into<Vec<u8>>) -> Self {
        Self::new("memory", data.into(), false)
    }

    /// Wraps to the start at end of data
    pub fn playback(data: impl Into<Vec<u8>>) -> Self {
        Self::new("memory-playback", data.into(), true)
    }

    fn new(name: &str, data: Vec<u8>, looping: bool) -> Self {
        Self {
            name: name.to_string(),
            data,
            pos: 0,
            looping,
            rewound: false,
            closed: false,
        }
    }

    /// Append bytes as if they had just arrived
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        if self.looping {
            SourceKind::Playback
        } else {
            SourceKind::Serial
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if self.closed {
            return Err(SourceError::Closed(self.name.clone()));
        }
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        if n == 0 && self.looping && !buf.is_empty() {
            self.seek_to_start()?;
        }
        Ok(n)
    }

    fn seek_to_start(&mut self) -> Result<(), SourceError> {
        if self.looping {
            self.pos = 0;
            self.rewound = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn take_rewound(&mut self) -> bool {
        std::mem::take(&mut self.rewound)
    }
}

// ============================================================================
// Capture tee
// ============================================================================

/// Wraps another source and appends every byte read to a capture file.
/// The capture replays bit-for-bit through [`FileSource`].
pub struct CaptureSource {
    inner: Box<dyn ByteSource>,
    writer: Option<BufWriter<File>>,
    path: String,
}

impl CaptureSource {
    pub fn new(inner: Box<dyn ByteSource>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening capture file {}", path.display()))?;
        info!(source = inner.name(), capture = %path.display(), "capturing raw input");
        Ok(Self {
            inner,
            writer: Some(BufWriter::new(file)),
            path: path.display().to_string(),
        })
    }
}

impl ByteSource for CaptureSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(w) = self.writer.as_mut() {
                if let Err(e) = w.write_all(&buf[..n]) {
                    // a failing capture must not take the live input down
                    warn!(capture = %self.path, error = %e, "capture write failed, disabling");
                    self.writer = None;
                }
            }
        }
        Ok(n)
    }

    fn seek_to_start(&mut self) -> Result<(), SourceError> {
        self.inner.seek_to_start()
    }

    fn close(&mut self) {
        if let Some(mut w) = self.writer.take() {
            if let Err(e) = w.flush() {
                warn!(capture = %self.path, error = %e, "capture flush failed");
            }
        }
        self.inner.close();
    }

    fn take_rewound(&mut self) -> bool {
        self.inner.take_rewound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_live_times_out() {
        let mut src = MemorySource::live(vec![1, 2, 3]);
        assert_eq!(src.read_up_to(5).unwrap(), vec![1, 2, 3]);
        assert_eq!(src.read_byte().unwrap(), None);
        assert!(!src.take_rewound());
    }

    #[test]
    fn test_memory_playback_wraps() {
        let mut src = MemorySource::playback(vec![1, 2]);
        assert_eq!(src.read_up_to(2).unwrap(), vec![1, 2]);
        assert_eq!(src.read_byte().unwrap(), None);
        assert!(src.take_rewound());
        assert!(!src.take_rewound());
        assert_eq!(src.read_byte().unwrap(), Some(1));
    }

    #[test]
    fn test_memory_close_is_idempotent() {
        let mut src = MemorySource::live(vec![1]);
        src.close();
        src.close();
        assert!(matches!(src.read_byte(), Err(SourceError::Closed(_))));
    }

    #[test]
    fn test_file_source_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        std::fs::write(&path, [0xAA, 0xBB]).unwrap();
        let mut src = FileSource::open(&path).unwrap();
        assert_eq!(src.kind(), SourceKind::Playback);
        assert_eq!(src.read_up_to(3).unwrap(), vec![0xAA, 0xBB]);
        assert!(src.take_rewound());
        assert_eq!(src.read_byte().unwrap(), Some(0xAA));
    }

    #[test]
    fn test_file_source_byte_reads_span_buffer_refills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.bin");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();
        let mut src = FileSource::open(&path).unwrap();

        for (i, expected) in data.iter().enumerate() {
            assert_eq!(src.read_byte().unwrap(), Some(*expected), "byte {}", i);
        }
        assert!(!src.take_rewound());
        assert_eq!(src.read_byte().unwrap(), None);
        assert!(src.take_rewound());
        assert_eq!(src.read_byte().unwrap(), Some(data[0]));
        assert_eq!(src.read_byte().unwrap(), Some(data[1]));

        src.close();
        assert!(matches!(src.read_byte(), Err(SourceError::Closed(_))));
    }

    #[test]
    fn test_missing_playback_file_errors() {
        assert!(FileSource::open("/nonexistent/capture.bin").is_err());
    }

    #[test]
    fn test_capture_tee_replays_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tee.bin");
        let data: Vec<u8> = (0u8..=255).collect();
        let mut tee = CaptureSource::new(Box::new(MemorySource::live(data.clone())), &path).unwrap();
        let got = tee.read_up_to(300).unwrap();
        assert_eq!(got, data);
        tee.close();
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_udp_empty_read_is_not_error() {
        let mut src = UdpSource::bind(0).unwrap();
        assert_eq!(src.read_byte().unwrap(), None);
        let port = src.local_port().unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        tx.send_to(&[0x7E, 0x00, 0x7E], ("127.0.0.1", port)).unwrap();
        let mut got = Vec::new();
        for _ in 0..200 {
            if let Some(b) = src.read_byte().unwrap() {
                got.push(b);
                if got.len() == 3 {
                    break;
                }
            } else {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        assert_eq!(got, vec![0x7E, 0x00, 0x7E]);
    }
}
