use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use nix::fcntl::OFlag;
use nix::sys::termios::{self, BaudRate, SetArg};
use tracing::{debug, info};

use super::{SensorSource, SourceError};

pub const DEFAULT_BAUD: u32 = 115_200;
/// Time the device gets to answer before its output is drained.
pub const DEFAULT_RESPONSE_DELAY: Duration = Duration::from_millis(500);

/// A serial device, opened non-blocking so a read returns only what is
/// already buffered.
pub struct SerialSource<P = File> {
    port: P,
    label: String,
    response_delay: Duration,
}

impl SerialSource<File> {
    /// Open `path` raw at `baud`.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let speed = baud_rate(baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
            .open(path)
            .map_err(|source| SourceError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let configure = || -> nix::Result<()> {
            let mut tio = termios::tcgetattr(&file)?;
            termios::cfmakeraw(&mut tio);
            termios::cfsetspeed(&mut tio, speed)?;
            termios::tcsetattr(&file, SetArg::TCSANOW, &tio)
        };
        configure().map_err(|source| SourceError::Configure {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Opened serial port {} at {} baud", path.display(), baud);
        Ok(Self::from_port(file, path.display().to_string()))
    }
}

impl<P: Read + Write> SerialSource<P> {
    /// Wrap an already-open, non-blocking port.
    pub fn from_port(port: P, label: impl Into<String>) -> Self {
        Self {
            port,
            label: label.into(),
            response_delay: DEFAULT_RESPONSE_DELAY,
        }
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// Drain everything currently buffered without blocking.
    fn read_available(&mut self) -> Result<String, SourceError> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

impl<P: Read + Write> SensorSource for SerialSource<P> {
    async fn query(&mut self, query: &[u8]) -> Result<String, SourceError> {
        self.port.write_all(query)?;
        self.port.flush()?;
        tokio::time::sleep(self.response_delay).await;
        let text = self.read_available()?;
        debug!("{} answered {} bytes", self.label, text.len());
        Ok(text)
    }

    fn describe(&self) -> String {
        format!("serial port {}", self.label)
    }
}

fn baud_rate(baud: u32) -> Result<BaudRate, SourceError> {
    Ok(match baud {
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        other => return Err(SourceError::UnsupportedBaud(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn device_pair() -> (SerialSource<UnixStream>, UnixStream) {
        let (ours, device) = UnixStream::pair().unwrap();
        ours.set_nonblocking(true).unwrap();
        let source = SerialSource::from_port(ours, "test").with_response_delay(Duration::ZERO);
        (source, device)
    }

    #[tokio::test]
    async fn test_query_writes_byte_and_drains_buffer() {
        let (mut source, mut device) = device_pair();
        device.write_all(b"{'t':[1]}\r\nok\r\n").unwrap();

        let text = source.query(b"?").await.unwrap();
        assert_eq!(text, "{'t':[1]}\r\nok\r\n");

        let mut sent = [0u8; 1];
        device.read_exact(&mut sent).unwrap();
        assert_eq!(&sent, b"?");
    }

    #[tokio::test]
    async fn test_empty_buffer_is_empty_string() {
        let (mut source, _device) = device_pair();
        assert_eq!(source.query(b"?").await.unwrap(), "");
    }

    #[test]
    fn test_baud_rates() {
        assert!(baud_rate(115_200).is_ok());
        assert!(matches!(baud_rate(1234), Err(SourceError::UnsupportedBaud(1234))));
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            SerialSource::open("/dev/does-not-exist-tty", DEFAULT_BAUD),
            Err(SourceError::Open { .. })
        ));
    }

    #[test]
    fn test_open_regular_file_is_not_a_tty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            SerialSource::open(file.path(), DEFAULT_BAUD),
            Err(SourceError::Configure { .. })
        ));
    }
}
