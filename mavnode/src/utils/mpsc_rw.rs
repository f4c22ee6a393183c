//! [`Read`] / [`Write`] adapters over [`mpsc`] byte-buffer channels.
//!
//! Used to plug in-memory transports into channels: custom endpoints and
//! tests feed a channel through an [`MpscWriter`] / [`MpscReader`] pair.

use std::cmp::min;
use std::io::{Read, Write};
use std::sync::mpsc;

/// Wrapper around [`mpsc::Receiver`] that implements [`Read`].
///
/// When the channel is closed, reads return
/// [`ErrorKind::ConnectionAborted`](std::io::ErrorKind::ConnectionAborted).
#[derive(Debug)]
pub struct MpscReader {
    receiver: mpsc::Receiver<Vec<u8>>,
    buf: Vec<u8>,
}

impl MpscReader {
    /// Creates a new [`MpscReader`] from an [`mpsc::Receiver`].
    pub fn new(receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            receiver,
            buf: Vec::new(),
        }
    }
}

impl Read for MpscReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.buf.is_empty() {
            let mut received = self.receiver.recv().map_err(|err| {
                std::io::Error::new(std::io::ErrorKind::ConnectionAborted, err)
            })?;
            self.buf.append(&mut received);
        }

        let len = min(self.buf.len(), buf.len());
        buf[..len].copy_from_slice(&self.buf[..len]);
        self.buf.drain(..len);

        Ok(len)
    }
}

/// Wrapper around [`mpsc::Sender`] that implements [`Write`].
///
/// When the channel is closed, writes return
/// [`ErrorKind::ConnectionAborted`](std::io::ErrorKind::ConnectionAborted).
#[derive(Clone, Debug)]
pub struct MpscWriter {
    sender: mpsc::Sender<Vec<u8>>,
}

impl MpscWriter {
    /// Creates a new [`MpscWriter`] from an [`mpsc::Sender`].
    pub fn new(sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

impl Write for MpscWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.sender.send(buf.to_vec()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "channel closed")
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod mpsc_rw_tests {
    use super::*;

    #[test]
    fn reader_buffers_partial_reads() {
        let (tx, rx) = mpsc::channel();
        let mut reader = MpscReader::new(rx);

        tx.send(vec![1, 2, 3, 4, 5]).unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);

        drop(tx);
        assert_eq!(
            reader.read(&mut buf).unwrap_err().kind(),
            std::io::ErrorKind::ConnectionAborted
        );
    }

    #[test]
    fn writer_forwards_buffers() {
        let (tx, rx) = mpsc::channel();
        let mut writer = MpscWriter::new(tx);

        writer.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(rx.recv().unwrap(), vec![1, 2, 3]);
    }
}
