use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::codec::{decode_message, truncation, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any blocking `Read` source.
///
/// Handles partial reads internally, so callers always get complete messages.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached
    /// between frames, and a truncation error when EOF cuts a frame short.
    pub fn read_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(message) = decode_message(&mut self.buf, self.config.max_payload_size)? {
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(truncation(&self.buf).unwrap_or(FrameError::ConnectionClosed));
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Iterate messages until the source closes.
    ///
    /// A clean close ends the iteration; any other error is yielded once and
    /// then ends it.
    pub fn messages(&mut self) -> Messages<'_, T> {
        Messages {
            reader: self,
            done: false,
        }
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Iterator returned by [`FrameReader::messages`].
pub struct Messages<'a, T> {
    reader: &'a mut FrameReader<T>,
    done: bool,
}

impl<T: Read> Iterator for Messages<'_, T> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_message() {
            Ok(message) => Some(Ok(message)),
            Err(FrameError::ConnectionClosed) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_message;

    fn wire(messages: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for message in messages {
            encode_message(message, &mut buf);
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_message() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"hello"])));
        let message = reader.read_message().unwrap();

        assert_eq!(message.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_messages() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        assert_eq!(reader.read_message().unwrap().as_ref(), b"one");
        assert_eq!(reader.read_message().unwrap().as_ref(), b"two");
        assert_eq!(reader.read_message().unwrap().as_ref(), b"three");
        assert!(matches!(
            reader.read_message().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn read_message_with_large_payload() {
        let payload = vec![0xAB; 64 * 1024];
        let mut reader = FrameReader::new(Cursor::new(wire(&[&payload])));
        let message = reader.read_message().unwrap();

        assert_eq!(message.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow", b"and steady"]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        assert_eq!(reader.read_message().unwrap().as_ref(), b"slow");
        assert_eq!(reader.read_message().unwrap().as_ref(), b"and steady");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = wire(&[b"complete"]);
        partial.extend_from_slice(&[0x0A, b'a', b'b', b'c']);

        let mut reader = FrameReader::new(Cursor::new(partial));
        assert_eq!(reader.read_message().unwrap().as_ref(), b"complete");
        let err = reader.read_message().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 10,
                received: 3
            }
        ));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let cfg = FrameConfig {
            max_payload_size: 16,
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire(&[&[0u8; 1024]])), cfg);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn messages_iterator_stops_at_clean_close() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"a", b"b"])));
        let collected: Vec<Bytes> = reader.messages().map(|m| m.unwrap()).collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].as_ref(), b"b");
    }

    #[test]
    fn messages_iterator_yields_error_once() {
        let mut bytes = wire(&[b"a"]);
        bytes.push(0x05);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut iter = reader.messages();

        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next().unwrap(),
            Err(FrameError::Truncated { expected: 5, .. })
        ));
        assert!(iter.next().is_none());
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            if buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.write_message(b"ping").unwrap();
        let message = reader.read_message().unwrap();

        assert_eq!(message.as_ref(), b"ping");
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = WouldBlockThenData {
            state: 0,
            bytes: wire(&[b"ok"]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let err = framed.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    struct WouldBlockThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            read_remaining(&self.bytes, &mut self.pos, buf)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&[b"ok"]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let message = framed.read_message().unwrap();

        assert_eq!(message.as_ref(), b"ok");
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            read_remaining(&self.bytes, &mut self.pos, buf)
        }
    }

    fn read_remaining(bytes: &[u8], pos: &mut usize, buf: &mut [u8]) -> std::io::Result<usize> {
        if *pos >= bytes.len() {
            return Ok(0);
        }
        let n = (bytes.len() - *pos).min(buf.len());
        buf[..n].copy_from_slice(&bytes[*pos..*pos + n]);
        *pos += n;
        Ok(n)
    }
}
