//! 帧编解码

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::protocol::Message;
use crate::core::error::{ChannelError, ChannelResult};

/// 帧头长度（u32 长度字段）
pub const HEADER_LEN: usize = 4;

/// 编码一个完整的帧
pub fn encode_frame(message: &Message) -> ChannelResult<Vec<u8>> {
    let body = message.encode_body()?;
    let len = u32::try_from(body.len() + 1).map_err(|_| ChannelError::FrameTooLarge {
        size: body.len() + 1,
        limit: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + 1 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.push(message.type_byte());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// 解码一个完整的帧；`bytes` 必须恰好是一个帧
pub fn decode_frame(bytes: &[u8], max_frame_bytes: usize) -> ChannelResult<Message> {
    if bytes.len() < HEADER_LEN {
        return Err(ChannelError::ProtocolViolation("truncated frame header".to_string()));
    }
    let len = frame_len(&bytes[..HEADER_LEN], max_frame_bytes)?;
    let rest = &bytes[HEADER_LEN..];
    if rest.len() != len {
        return Err(ChannelError::ProtocolViolation(format!(
            "frame declares {} bytes, got {}",
            len,
            rest.len()
        )));
    }
    Message::decode_body(rest[0], &rest[1..])
}

fn frame_len(header: &[u8], max_frame_bytes: usize) -> ChannelResult<usize> {
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(header);
    let len = u32::from_be_bytes(raw) as usize;
    if len == 0 {
        return Err(ChannelError::ProtocolViolation("empty frame".to_string()));
    }
    if len > max_frame_bytes {
        return Err(ChannelError::FrameTooLarge {
            size: len,
            limit: max_frame_bytes,
        });
    }
    Ok(len)
}

/// 读取下一个帧
///
/// 对端在帧边界关闭连接时返回 `Ok(None)`。帧头到达后，帧体必须在
/// `body_timeout` 内到达。
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
    body_timeout: Duration,
) -> ChannelResult<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let first = reader.read(&mut header).await?;
    if first == 0 {
        return Ok(None);
    }
    read_frame_rest(reader, header, first, max_frame_bytes, body_timeout)
        .await
        .map(Some)
}

/// 在已经读到帧头前 `first` 个字节后读完这个帧
///
/// 剩余的帧头和帧体必须在 `body_timeout` 内到达。
pub async fn read_frame_rest<R>(
    reader: &mut R,
    mut header: [u8; HEADER_LEN],
    first: usize,
    max_frame_bytes: usize,
    body_timeout: Duration,
) -> ChannelResult<Message>
where
    R: AsyncRead + Unpin,
{
    let body = tokio::time::timeout(body_timeout, async {
        if first < HEADER_LEN {
            reader.read_exact(&mut header[first..]).await?;
        }
        let len = frame_len(&header, max_frame_bytes)?;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        Ok::<_, ChannelError>(body)
    })
    .await
    .map_err(|_| ChannelError::Timeout("frame body".to_string()))?
    .map_err(|err| match err {
        ChannelError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => ChannelError::Closed,
        other => other,
    })?;

    Message::decode_body(body[0], &body[1..])
}

/// 写入一个帧并刷新
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> ChannelResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::protocol::{DebugEvent, DebugEventKind, Handshake, PROTOCOL_VERSION};

    fn handshake() -> Message {
        Message::Handshake(Handshake {
            version: PROTOCOL_VERSION,
            checksum: "deadbeef".to_string(),
        })
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&handshake()).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - HEADER_LEN);
        assert_eq!(frame[4], 0x01);
        assert_eq!(decode_frame(&frame, 1024).unwrap(), handshake());
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let frame = encode_frame(&handshake()).unwrap();
        assert!(matches!(
            decode_frame(&frame, 4),
            Err(ChannelError::FrameTooLarge { limit: 4, .. })
        ));
        assert!(matches!(
            decode_frame(&[0, 0, 0, 0], 1024),
            Err(ChannelError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_async_read_write() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let event = Message::DebugEvent(DebugEvent::new(DebugEventKind::Paused, "Boss.take_damage"));

        write_frame(&mut client, &handshake()).await.unwrap();
        write_frame(&mut client, &event).await.unwrap();
        drop(client);

        let timeout = Duration::from_secs(1);
        assert_eq!(read_frame(&mut server, 1024, timeout).await.unwrap(), Some(handshake()));
        assert_eq!(read_frame(&mut server, 1024, timeout).await.unwrap(), Some(event));
        assert_eq!(read_frame(&mut server, 1024, timeout).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_body_reports_closed() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let frame = encode_frame(&handshake()).unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut client, &frame[..frame.len() - 2])
            .await
            .unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server, 1024, Duration::from_secs(1)).await,
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let frame = encode_frame(&handshake()).unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut client, &frame[..6])
            .await
            .unwrap();

        assert!(matches!(
            read_frame(&mut server, 1024, Duration::from_millis(20)).await,
            Err(ChannelError::Timeout(_))
        ));
        drop(client);
    }
}
