use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use linechat_transport::ChatStream;

use crate::codec::{decode_frame_after, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Bytes already buffered survive a timed-out read, so a read timeout can be
/// used to poll without losing data.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    /// Leading bytes of `buf` already searched for a delimiter.
    scanned: usize,
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
            scanned: 0,
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached on a frame
    /// boundary and `Err(FrameError::IncompleteFrame)` when EOF cuts a frame short.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            let decoded =
                decode_frame_after(&mut self.buf, self.scanned, self.config.max_line_length);
            match decoded {
                Ok(Some(frame)) => {
                    self.scanned = 0;
                    return Ok(frame);
                }
                Ok(None) => self.scanned = self.buf.len(),
                Err(err) => {
                    self.scanned = 0;
                    return Err(err);
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Err(FrameError::ConnectionClosed);
                }
                return Err(FrameError::IncompleteFrame {
                    pending: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<ChatStream> {
    /// Create a frame reader for `ChatStream` and apply read timeout from config.
    pub fn with_config_chat(inner: ChatStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: linechat_transport::TransportError) -> FrameError {
    match err {
        linechat_transport::TransportError::Io(io)
        | linechat_transport::TransportError::Accept(io) => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::new(other.io_kind(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::SocketAddr;

    use linechat_transport::ChatListener;

    use super::*;
    use crate::writer::FrameWriter;

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(b"hello\n".to_vec()));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.text, "hello");
    }

    #[test]
    fn read_multiple_frames() {
        let mut reader = FrameReader::new(Cursor::new(b"one\ntwo\nthree\n".to_vec()));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!(
            (f1.text.as_str(), f2.text.as_str(), f3.text.as_str()),
            ("one", "two", "three")
        );
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn payload_lengths_zero_through_4096_across_reads() {
        for len in [0usize, 1, 2, 7, 63, 64, 65, 1000, 4095, 4096] {
            let payload: String = (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect();
            let mut wire = payload.clone().into_bytes();
            wire.push(b'\n');

            let chunked = ChunkedReader {
                bytes: wire,
                pos: 0,
                chunk: 64,
            };
            let mut reader = FrameReader::new(chunked);
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.text.len(), len);
            assert_eq!(frame.text, payload);
        }
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ChunkedReader {
            bytes: b"slow\nsteady\n".to_vec(),
            pos: 0,
            chunk: 1,
        };
        let mut reader = FrameReader::new(byte_reader);

        assert_eq!(reader.read_frame().unwrap().text, "slow");
        assert_eq!(reader.read_frame().unwrap().text, "steady");
    }

    #[test]
    fn long_line_in_small_chunks_is_scanned_once() {
        let payload = "z".repeat(10_000);
        let mut wire = payload.clone().into_bytes();
        wire.extend_from_slice(b"\nnext\n");

        let mut reader = FrameReader::new(ChunkedReader {
            bytes: wire,
            pos: 0,
            chunk: 100,
        });
        assert_eq!(reader.read_frame().unwrap().text, payload);
        assert_eq!(reader.scanned, 0);
        assert_eq!(reader.read_frame().unwrap().text, "next");
    }

    #[test]
    fn scan_offset_tracks_buffer_across_timeouts() {
        let reader = PartialThenTimeout {
            steps: vec![
                Ok(b"abc".to_vec()),
                Err(ErrorKind::WouldBlock),
                Ok(b"def".to_vec()),
                Err(ErrorKind::WouldBlock),
                Ok(b"\n".to_vec()),
            ],
        };
        let mut framed = FrameReader::new(reader);

        assert!(framed.read_frame().unwrap_err().is_timeout());
        assert_eq!(framed.scanned, 3);
        assert!(framed.read_frame().unwrap_err().is_timeout());
        assert_eq!(framed.scanned, 6);

        assert_eq!(framed.read_frame().unwrap().text, "abcdef");
        assert_eq!(framed.scanned, 0);
    }

    #[test]
    fn coalesced_frames_are_split() {
        let mut reader = FrameReader::new(Cursor::new(b"a\nb\n\nc\n".to_vec()));
        let texts: Vec<String> = (0..4).map(|_| reader.read_frame().unwrap().text).collect();
        assert_eq!(texts, vec!["a", "b", "", "c"]);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut reader = FrameReader::new(Cursor::new(b"done\nonly-part".to_vec()));
        assert_eq!(reader.read_frame().unwrap().text, "done");

        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::IncompleteFrame { pending: 9 }));
    }

    #[test]
    fn oversized_line_in_stream() {
        let cfg = FrameConfig {
            max_line_length: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(vec![b'x'; 64]), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLong { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = FlakyReader {
            error: Some(ErrorKind::Interrupted),
            bytes: b"ok\n".to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap().text, "ok");
    }

    #[test]
    fn timeout_keeps_partial_data() {
        let reader = PartialThenTimeout {
            steps: vec![Ok(b"hel".to_vec()), Err(ErrorKind::WouldBlock), Ok(b"lo\n".to_vec())],
        };
        let mut framed = FrameReader::new(reader);

        let err = framed.read_frame().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(framed.buffered(), 3);

        assert_eq!(framed.read_frame().unwrap().text, "hello");
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = ChatListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap(), 1).unwrap();
        let addr = listener.local_addr();

        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream);
            (0..100)
                .map(|_| reader.read_frame().unwrap().text)
                .collect::<Vec<_>>()
        });

        let stream = ChatStream::connect(addr, None).unwrap();
        let mut writer = FrameWriter::new(stream);
        for i in 0..100 {
            writer.send(&format!("msg-{i}")).unwrap();
        }

        let received = server.join().unwrap();
        let expected: Vec<String> = (0..100).map(|i| format!("msg-{i}")).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn applies_read_timeout_for_chat_stream() {
        let listener = ChatListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap(), 1).unwrap();
        let addr = listener.local_addr();

        let _client = ChatStream::connect(addr, None).unwrap();
        let stream = listener.accept().unwrap();

        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_chat(stream, cfg).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_timeout());
    }

    struct ChunkedReader {
        bytes: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len()).min(self.chunk);
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct FlakyReader {
        error: Option<ErrorKind>,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.error.take() {
                return Err(std::io::Error::from(kind));
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct PartialThenTimeout {
        steps: Vec<std::result::Result<Vec<u8>, ErrorKind>>,
    }

    impl Read for PartialThenTimeout {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.steps.is_empty() {
                return Ok(0);
            }
            match self.steps.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(kind) => Err(std::io::Error::from(kind)),
            }
        }
    }
}
