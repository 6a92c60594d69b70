//! Packet frames on the reliable WebTransport stream, and the choice of
//! stream or datagram for each outgoing packet.
//!
//! A frame is a little-endian `u32` length followed by one encoded packet.
//! Frames longer than `MAX_MESSAGE_SIZE` are refused on both ends, the same
//! bound packet decoding applies.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::transport::Delivery;
use crate::constants::net::{MAX_DATAGRAM_SIZE, MAX_MESSAGE_SIZE};

const HEADER_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Frame of {len} bytes exceeds the {limit} byte limit")]
    Oversized { len: usize, limit: usize },
    #[error("Stream ended inside a frame")]
    Truncated,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Path an outgoing packet takes to the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Datagram,
    Stream,
    /// Unreliable, but too large for one datagram
    StreamFallback,
}

impl Route {
    pub fn for_packet(delivery: Delivery, len: usize) -> Self {
        match delivery {
            Delivery::Reliable => Route::Stream,
            Delivery::Unreliable if len <= MAX_DATAGRAM_SIZE => Route::Datagram,
            Delivery::Unreliable => Route::StreamFallback,
        }
    }
}

/// Splits a byte stream into frames
pub struct FrameReader<R> {
    stream: R,
    limit: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            limit: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Next frame payload, or `None` once the peer finished the stream
    /// between frames. The length is checked before the payload is read.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            match self.stream.read(&mut header[filled..]).await? {
                0 if filled == 0 => return Ok(None),
                0 => return Err(FramingError::Truncated),
                n => filled += n,
            }
        }

        let len = u32::from_le_bytes(header) as usize;
        if len > self.limit {
            return Err(FramingError::Oversized { len, limit: self.limit });
        }

        let mut payload = vec![0u8; len];
        match self.stream.read_exact(&mut payload).await {
            Ok(_) => Ok(Some(payload)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::Truncated),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `payload` as one frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<(), FramingError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::Oversized {
            len: payload.len(),
            limit: MAX_MESSAGE_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{decode, encode, ClientPacket};

    #[tokio::test]
    async fn test_packets_cross_a_duplex_stream() {
        let packets = vec![
            ClientPacket::ReqJoin("pilot".into()),
            ClientPacket::ReqSpawn,
            ClientPacket::Chat("hello".into()),
        ];
        let (mut client, server) = tokio::io::duplex(64);

        let sent = packets.clone();
        let writer = tokio::spawn(async move {
            for packet in &sent {
                write_frame(&mut client, &encode(packet).unwrap()).await.unwrap();
            }
        });

        let mut frames = FrameReader::new(server);
        for expected in &packets {
            let data = frames.next_frame().await.unwrap().unwrap();
            assert_eq!(&decode::<ClientPacket>(&data).unwrap(), expected);
        }
        writer.await.unwrap();

        // writer half dropped between frames
        assert!(frames.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_ending_mid_frame_is_truncated() {
        let mut frames = FrameReader::new(&[5u8, 0][..]);
        assert!(matches!(frames.next_frame().await, Err(FramingError::Truncated)));

        let mut frames = FrameReader::new(&[5u8, 0, 0, 0, 1, 2][..]);
        assert!(matches!(frames.next_frame().await, Err(FramingError::Truncated)));
    }

    #[tokio::test]
    async fn test_length_checked_before_payload() {
        let header = 100u32.to_le_bytes();
        let mut frames = FrameReader::new(&header[..]).with_limit(64);
        assert!(matches!(
            frames.next_frame().await,
            Err(FramingError::Oversized { len: 100, limit: 64 })
        ));

        let header = u32::MAX.to_le_bytes();
        let mut frames = FrameReader::new(&header[..]);
        assert!(matches!(frames.next_frame().await, Err(FramingError::Oversized { .. })));
    }

    #[tokio::test]
    async fn test_empty_frame_is_not_end_of_stream() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &[]).await.unwrap();
        write_frame(&mut buffer, b"x").await.unwrap();

        let mut frames = FrameReader::new(&buffer[..]);
        assert_eq!(frames.next_frame().await.unwrap(), Some(Vec::new()));
        assert_eq!(frames.next_frame().await.unwrap(), Some(b"x".to_vec()));
        assert_eq!(frames.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_write_sends_nothing() {
        let mut buffer = Vec::new();
        let result = write_frame(&mut buffer, &vec![0u8; MAX_MESSAGE_SIZE + 1]).await;
        assert!(matches!(result, Err(FramingError::Oversized { .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_route_for_packet() {
        assert_eq!(Route::for_packet(Delivery::Reliable, 10), Route::Stream);
        assert_eq!(Route::for_packet(Delivery::Reliable, MAX_DATAGRAM_SIZE * 4), Route::Stream);
        assert_eq!(Route::for_packet(Delivery::Unreliable, MAX_DATAGRAM_SIZE), Route::Datagram);
        assert_eq!(
            Route::for_packet(Delivery::Unreliable, MAX_DATAGRAM_SIZE + 1),
            Route::StreamFallback
        );
    }
}
