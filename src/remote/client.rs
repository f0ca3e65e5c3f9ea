//! 工具侧客户端
//!
//! 外部开发环境通过它连接运行中的进程、推送更新、检视对象和接收调试事件。

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::codec::{read_frame, read_frame_rest, write_frame, HEADER_LEN};
use super::protocol::{
    DebugEvent, Handshake, HandshakeAck, InspectRequest, InspectedHandle, Message, UpdateResult,
    PROTOCOL_VERSION,
};
use crate::binding::ClassId;
use crate::core::error::{ChannelError, ChannelResult};
use crate::reflection::UpdatePayload;

const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    max_frame_bytes: usize,
    reply_timeout: Duration,
    /// 等待回复期间收到的调试事件
    events: VecDeque<DebugEvent>,
}

impl RemoteClient {
    /// 建立 TCP 连接，不握手
    pub async fn open<A: ToSocketAddrs>(address: A) -> ChannelResult<Self> {
        let stream = TcpStream::connect(address).await?;
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            events: VecDeque::new(),
        })
    }

    /// 连接并以当前协议版本握手；被拒绝时返回 `HandshakeRefused`
    pub async fn connect<A: ToSocketAddrs>(address: A, checksum: &str) -> ChannelResult<Self> {
        let mut client = Self::open(address).await?;
        let ack = client.handshake(PROTOCOL_VERSION, checksum).await?;
        if !ack.accepted {
            let reason = ack.reason.map(|r| r.to_string()).unwrap_or_default();
            return Err(ChannelError::HandshakeRefused(reason));
        }
        Ok(client)
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub async fn handshake(&mut self, version: u32, checksum: &str) -> ChannelResult<HandshakeAck> {
        self.send(&Message::Handshake(Handshake {
            version,
            checksum: checksum.to_string(),
        }))
        .await?;
        match self.expect_reply().await? {
            Message::HandshakeAck(ack) => Ok(ack),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn push_update(&mut self, payload: UpdatePayload) -> ChannelResult<UpdateResult> {
        self.send(&Message::UpdatePayload(payload)).await?;
        match self.expect_reply().await? {
            Message::UpdateResult(result) => Ok(result),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn inspect(&mut self, class: impl Into<ClassId>) -> ChannelResult<Vec<InspectedHandle>> {
        self.send(&Message::InspectRequest(InspectRequest { class: class.into() }))
            .await?;
        match self.expect_reply().await? {
            Message::InspectResponse(response) => Ok(response.handles),
            other => Err(unexpected(&other)),
        }
    }

    /// 下一条调试事件；超时返回 `None`
    pub async fn next_event(&mut self, timeout: Duration) -> ChannelResult<Option<DebugEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        // 超时只作用于帧的第一次读取，帧开始后按帧体超时读完
        let mut header = [0u8; HEADER_LEN];
        let first = match tokio::time::timeout(timeout, self.reader.read(&mut header)).await {
            Err(_) => return Ok(None),
            Ok(read) => read?,
        };
        if first == 0 {
            return Err(ChannelError::Closed);
        }
        match read_frame_rest(&mut self.reader, header, first, self.max_frame_bytes, self.reply_timeout).await? {
            Message::DebugEvent(event) => Ok(Some(event)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn send(&mut self, message: &Message) -> ChannelResult<()> {
        write_frame(&mut self.writer, message).await
    }

    /// 读取下一条消息；连接关闭时返回 `Closed`
    pub async fn receive(&mut self) -> ChannelResult<Message> {
        read_frame(&mut self.reader, self.max_frame_bytes, self.reply_timeout)
            .await?
            .ok_or(ChannelError::Closed)
    }

    /// 读取下一条非调试事件消息，事件暂存起来
    async fn expect_reply(&mut self) -> ChannelResult<Message> {
        let deadline = self.reply_timeout;
        tokio::time::timeout(deadline, async {
            loop {
                match self.receive().await? {
                    Message::DebugEvent(event) => self.events.push_back(event),
                    reply => return Ok::<_, ChannelError>(reply),
                }
            }
        })
        .await
        .map_err(|_| ChannelError::Timeout("reply".to_string()))?
    }
}

fn unexpected(message: &Message) -> ChannelError {
    ChannelError::ProtocolViolation(format!("unexpected {}", message.name()))
}
