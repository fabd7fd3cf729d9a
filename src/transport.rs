//! Async transport abstraction over the physical serial link.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait SerialPort: Send + Sync {
    async fn write_all(&self, data: &[u8]) -> io::Result<()>;

    /// Reads exactly `len` bytes, or returns `Ok(None)` if `timeout` elapses first.
    async fn read_exact(&self, len: usize, timeout: Duration) -> io::Result<Option<Vec<u8>>>;

    async fn bytes_available(&self) -> io::Result<usize>;

    async fn flush_input(&self) -> io::Result<()>;

    async fn flush_output(&self) -> io::Result<()>;
}

/// Real serial port, backed by the blocking `serialport` crate and bridged
/// into async code via `spawn_blocking`, the same pattern used elsewhere in
/// this crate for bridging blocking I/O into async code.
pub struct RealSerialPort {
    inner: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
}

impl RealSerialPort {
    pub fn open(port_name: &str, baud_rate: u32, default_timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(default_timeout)
            .open()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(port)),
        })
    }
}

#[async_trait]
impl SerialPort for RealSerialPort {
    async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let inner = Arc::clone(&self.inner);
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut port = inner.lock().unwrap();
            port.write_all(&data)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    async fn read_exact(&self, len: usize, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || {
            use std::io::Read;
            let mut port = inner.lock().unwrap();
            port.set_timeout(timeout)?;
            let mut buf = vec![0u8; len];
            match port.read_exact(&mut buf) {
                Ok(()) => Ok(Some(buf)),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        Ok(result)
    }

    async fn bytes_available(&self) -> io::Result<usize> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let port = inner.lock().unwrap();
            port.bytes_to_read().map(|n| n as usize)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    async fn flush_input(&self) -> io::Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut port = inner.lock().unwrap();
            port.clear(serialport::ClearBuffer::Input)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    async fn flush_output(&self) -> io::Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut port = inner.lock().unwrap();
            port.clear(serialport::ClearBuffer::Output)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// In-memory fake transport for tests: a request queue the test drives and
/// a reply queue the test pre-loads, plus raw byte queues for UART passthrough.
pub struct LoopbackPort {
    written: Mutex<Vec<u8>>,
    replies: Mutex<VecDeque<u8>>,
}

impl LoopbackPort {
    pub fn new() -> Self {
        Self {
            written: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queue_reply(&self, bytes: &[u8]) {
        self.replies.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.written.lock().unwrap())
    }
}

impl Default for LoopbackPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SerialPort for LoopbackPort {
    async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn read_exact(&self, len: usize, _timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() < len {
            return Ok(None);
        }
        Ok(Some(replies.drain(0..len).collect()))
    }

    async fn bytes_available(&self) -> io::Result<usize> {
        Ok(self.replies.lock().unwrap().len())
    }

    async fn flush_input(&self) -> io::Result<()> {
        self.replies.lock().unwrap().clear();
        Ok(())
    }

    async fn flush_output(&self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_round_trips() {
        let port = LoopbackPort::new();
        port.write_all(&[1, 2, 3]).await.unwrap();
        assert_eq!(port.written_bytes(), vec![1, 2, 3]);

        port.queue_reply(&[9, 8, 7]);
        assert_eq!(port.bytes_available().await.unwrap(), 3);
        let got = port.read_exact(3, Duration::from_millis(10)).await.unwrap();
        assert_eq!(got, Some(vec![9, 8, 7]));
    }

    #[tokio::test]
    async fn loopback_read_exact_short_returns_none() {
        let port = LoopbackPort::new();
        port.queue_reply(&[1, 2]);
        let got = port.read_exact(3, Duration::from_millis(10)).await.unwrap();
        assert_eq!(got, None);
    }
}
