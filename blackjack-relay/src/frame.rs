//! Wire framing for the relay.
//!
//! Every frame is a fixed four byte header followed by a variable body. The
//! header carries the body length as right-aligned decimal text (`"  27"`),
//! and the body is the JSON encoding of an [`ActionRecord`].

use std::{fmt, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::deck::Card;

/// Width of the length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest body a header may declare.
pub const MAX_BODY_LEN: usize = 512;

const _: () = assert!(MAX_BODY_LEN < 10_usize.pow(HEADER_LEN as u32));

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame header {0:?}")]
    MalformedHeader(String),
    #[error("body length {len} exceeds the maximum of {max} bytes", max = MAX_BODY_LEN)]
    BodyTooLong { len: usize },
    #[error("invalid action record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}

/// The player action carried in a frame body.
///
/// `hit` and `stand` are independent hints; the server fills in `card` when it
/// deals on a hit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionRecord {
    #[serde(default)]
    pub hit: bool,
    #[serde(default)]
    pub stand: bool,
    #[serde(default)]
    pub card: Option<Card>,
}

impl ActionRecord {
    pub fn hit() -> Self {
        Self {
            hit: true,
            ..Self::default()
        }
    }

    pub fn stand() -> Self {
        Self {
            stand: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.hit {
            parts.push(match self.card {
                Some(card) => format!("hit: {card}"),
                None => "hit".to_string(),
            });
        }
        if self.stand {
            parts.push("stand".to_string());
        }
        if parts.is_empty() {
            return f.write_str("no action");
        }
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: [u8; HEADER_LEN],
    body: Vec<u8>,
}

impl Default for Frame {
    fn default() -> Self {
        let mut frame = Self {
            header: [b' '; HEADER_LEN],
            body: Vec::new(),
        };
        frame.encode_header();
        frame
    }
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps raw body bytes, rejecting bodies over [`MAX_BODY_LEN`].
    pub fn from_body(body: Vec<u8>) -> Result<Self, FrameError> {
        check_body_len(body.len())?;
        let mut frame = Self {
            header: [b' '; HEADER_LEN],
            body,
        };
        frame.encode_header();
        Ok(frame)
    }

    pub fn from_record(record: &ActionRecord) -> Result<Self, FrameError> {
        Self::from_body(serde_json::to_vec(record)?)
    }

    pub fn record(&self) -> Result<ActionRecord, FrameError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Replaces the body with `record` and re-encodes the header to match.
    pub fn set_record(&mut self, record: &ActionRecord) -> Result<(), FrameError> {
        let body = serde_json::to_vec(record)?;
        check_body_len(body.len())?;
        self.body = body;
        self.encode_header();
        Ok(())
    }

    pub fn header(&self) -> &[u8; HEADER_LEN] {
        &self.header
    }

    /// Raw header bytes; [`Frame::decode_header`] must run before the body is
    /// trusted again.
    pub(crate) fn header_mut(&mut self) -> &mut [u8; HEADER_LEN] {
        &mut self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut [u8] {
        &mut self.body
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Writes the current body length into the header region.
    pub fn encode_header(&mut self) {
        // The body never exceeds MAX_BODY_LEN, which always fits the header width.
        let text = format!("{:>width$}", self.body.len(), width = HEADER_LEN);
        self.header.copy_from_slice(text.as_bytes());
    }

    /// Parses the header and resizes the body to the declared length.
    ///
    /// The length is validated before the body is touched, so an oversized
    /// header never causes an allocation of that size.
    pub fn decode_header(&mut self) -> Result<usize, FrameError> {
        let len = parse_header(&self.header)?;
        self.body.clear();
        self.body.resize(len, 0);
        Ok(len)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn check_body_len(len: usize) -> Result<(), FrameError> {
    if len > MAX_BODY_LEN {
        return Err(FrameError::BodyTooLong { len });
    }
    Ok(())
}

fn parse_header(header: &[u8; HEADER_LEN]) -> Result<usize, FrameError> {
    let malformed = || FrameError::MalformedHeader(String::from_utf8_lossy(header).into_owned());

    let text = std::str::from_utf8(header)
        .map_err(|_| malformed())?
        .trim_start_matches(' ');
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(malformed());
    }

    let len = text.parse::<usize>().map_err(|_| malformed())?;
    check_body_len(len)?;
    Ok(len)
}

/// Reads one frame into `frame`, reusing its body storage.
///
/// Returns `Ok(false)` when the peer closes the stream cleanly between frames.
/// A stream that ends part way through a frame yields `UnexpectedEof`, and a
/// header that fails to decode yields `InvalidData`.
pub async fn read_frame_into<R>(reader: &mut R, frame: &mut Frame) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < HEADER_LEN {
        let bytes = reader.read(&mut frame.header[filled..]).await?;
        if bytes == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed inside a frame header",
            ));
        }
        filled += bytes;
    }

    frame.decode_header().map_err(to_io_error)?;
    reader.read_exact(frame.body_mut()).await?;
    Ok(true)
}

pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut frame = Frame::new();
    if read_frame_into(reader, &mut frame).await? {
        Ok(Some(frame))
    } else {
        Ok(None)
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.to_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: FrameError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{Rank, Suit};

    fn queen_of_hearts() -> Card {
        Card {
            rank: Rank::Queen,
            suit: Suit::Hearts,
        }
    }

    #[test]
    fn record_survives_encode_and_decode() {
        let records = [
            ActionRecord::default(),
            ActionRecord::hit(),
            ActionRecord::stand(),
            ActionRecord {
                hit: true,
                stand: true,
                card: Some(queen_of_hearts()),
            },
        ];

        for record in records {
            let frame = Frame::from_record(&record).expect("encode record");
            assert_eq!(frame.record().expect("decode record"), record);
        }
    }

    #[test]
    fn header_is_padded_decimal_text() {
        let frame = Frame::from_body(b"hello world".to_vec()).expect("frame");
        assert_eq!(frame.header(), b"  11");
        assert_eq!(frame.wire_len(), HEADER_LEN + 11);
    }

    #[test]
    fn decode_header_resizes_body() {
        let mut frame = Frame::new();
        frame.header_mut().copy_from_slice(b"  42");
        assert_eq!(frame.decode_header().expect("valid header"), 42);
        assert_eq!(frame.body_len(), 42);

        frame.header_mut().copy_from_slice(b"0007");
        assert_eq!(frame.decode_header().expect("leading zeros"), 7);
        assert_eq!(frame.body_len(), 7);
    }

    #[test]
    fn decode_header_rejects_oversized_length() {
        let mut frame = Frame::new();
        frame.header_mut().copy_from_slice(b"9999");
        let err = frame.decode_header().expect_err("oversized header");
        assert!(matches!(err, FrameError::BodyTooLong { len: 9999 }));
        assert!(frame.body().is_empty());
        assert!(frame.body.capacity() < 9999);
    }

    #[test]
    fn decode_header_rejects_garbage() {
        for header in [b"    ", b"-12 ", b"1 2 ", b"abcd", b"12  "] {
            let mut frame = Frame::new();
            frame.header_mut().copy_from_slice(header);
            assert!(
                matches!(frame.decode_header(), Err(FrameError::MalformedHeader(_))),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn oversized_body_is_rejected() {
        let err = Frame::from_body(vec![b'x'; MAX_BODY_LEN + 1]).expect_err("too long");
        assert!(matches!(err, FrameError::BodyTooLong { .. }));
        assert!(Frame::from_body(vec![b'x'; MAX_BODY_LEN]).is_ok());
    }

    #[test]
    fn set_record_reencodes_header() {
        let mut frame = Frame::from_record(&ActionRecord::hit()).expect("frame");
        let before = frame.body_len();

        let mut record = frame.record().expect("record");
        record.card = Some(queen_of_hearts());
        frame.set_record(&record).expect("set record");

        assert!(frame.body_len() > before);
        let declared = std::str::from_utf8(frame.header())
            .expect("ascii header")
            .trim()
            .parse::<usize>()
            .expect("numeric header");
        assert_eq!(declared, frame.body_len());
    }

    #[test]
    fn display_describes_actions() {
        let dealt = ActionRecord {
            hit: true,
            stand: false,
            card: Some(queen_of_hearts()),
        };
        assert_eq!(dealt.to_string(), "hit: queen of hearts");
        assert_eq!(ActionRecord::stand().to_string(), "stand");
        assert_eq!(ActionRecord::default().to_string(), "no action");
    }

    #[tokio::test]
    async fn frames_cross_a_stream() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let first = Frame::from_record(&ActionRecord::hit()).expect("frame");
        let second = Frame::from_record(&ActionRecord::stand()).expect("frame");

        write_frame(&mut writer, &first).await.expect("write first");
        write_frame(&mut writer, &second).await.expect("write second");
        drop(writer);

        let parsed_first = read_frame(&mut reader).await.expect("read").expect("frame");
        let parsed_second = read_frame(&mut reader).await.expect("read").expect("frame");
        assert_eq!(parsed_first, first);
        assert_eq!(parsed_second, second);
        assert!(read_frame(&mut reader).await.expect("clean eof").is_none());
    }

    #[tokio::test]
    async fn truncated_frames_are_errors() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer.write_all(b" 1").await.expect("partial header");
        drop(writer);
        let err = read_frame(&mut reader).await.expect_err("short header");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer.write_all(b"  10abc").await.expect("partial body");
        drop(writer);
        let err = read_frame(&mut reader).await.expect_err("short body");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn invalid_header_is_invalid_data() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer.write_all(b"zzzz").await.expect("header");
        let err = read_frame(&mut reader).await.expect_err("garbage header");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
