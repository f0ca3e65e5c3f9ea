//! 实时更新协议消息
//!
//! 每个消息在线上是一个帧：`[u32 大端长度][u8 类型][bincode 负载]`，
//! 长度包含类型字节。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::binding::ClassId;
use crate::core::error::{ChannelError, ChannelResult, UpdateRejection};
use crate::core::utils::current_timestamp_ms;
use crate::dispatch::{ObjectHandle, ObjectId};
use crate::reflection::{AffectedClasses, UpdatePayload};

/// 协议版本
pub const PROTOCOL_VERSION: u32 = 1;

/// 消息类型字节
pub mod message_type {
    pub const HANDSHAKE: u8 = 0x01;
    pub const HANDSHAKE_ACK: u8 = 0x02;
    pub const UPDATE_PAYLOAD: u8 = 0x03;
    pub const UPDATE_RESULT: u8 = 0x04;
    pub const INSPECT_REQUEST: u8 = 0x05;
    pub const INSPECT_RESPONSE: u8 = 0x06;
    pub const DEBUG_EVENT: u8 = 0x07;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub version: u32,
    /// 工具编译时使用的绑定表校验和
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeAck {
    pub accepted: bool,
    pub reason: Option<UpdateRejection>,
}

impl HandshakeAck {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn refuse(reason: UpdateRejection) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }
}

/// 更新结果：接受时带受影响的类，拒绝时带原因和出错的类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub accepted: bool,
    pub generation: u64,
    pub affected: Vec<ClassId>,
    pub rejection: Option<UpdateRejection>,
}

impl UpdateResult {
    pub fn accepted(affected: AffectedClasses) -> Self {
        Self {
            accepted: true,
            generation: affected.generation,
            affected: affected.classes,
            rejection: None,
        }
    }

    pub fn rejected(rejection: UpdateRejection) -> Self {
        Self {
            accepted: false,
            generation: 0,
            affected: Vec::new(),
            rejection: Some(rejection),
        }
    }
}

impl From<Result<AffectedClasses, UpdateRejection>> for UpdateResult {
    fn from(result: Result<AffectedClasses, UpdateRejection>) -> Self {
        match result {
            Ok(affected) => Self::accepted(affected),
            Err(rejection) => Self::rejected(rejection),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectRequest {
    pub class: ClassId,
}

/// 一个存活对象的检视记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectedHandle {
    pub handle: ObjectHandle,
    pub object_id: ObjectId,
    pub class: ClassId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectResponse {
    pub class: ClassId,
    pub handles: Vec<InspectedHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugEventKind {
    Breakpoint,
    Paused,
    Resumed,
    ClassUpdated,
    Log,
}

impl fmt::Display for DebugEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebugEventKind::Breakpoint => "breakpoint",
            DebugEventKind::Paused => "paused",
            DebugEventKind::Resumed => "resumed",
            DebugEventKind::ClassUpdated => "class_updated",
            DebugEventKind::Log => "log",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEvent {
    pub kind: DebugEventKind,
    pub context: String,
    pub timestamp_ms: u64,
}

impl DebugEvent {
    pub fn new(kind: DebugEventKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            timestamp_ms: current_timestamp_ms(),
        }
    }
}

/// 协议消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(Handshake),
    HandshakeAck(HandshakeAck),
    UpdatePayload(UpdatePayload),
    UpdateResult(UpdateResult),
    InspectRequest(InspectRequest),
    InspectResponse(InspectResponse),
    DebugEvent(DebugEvent),
}

impl Message {
    pub fn type_byte(&self) -> u8 {
        match self {
            Message::Handshake(_) => message_type::HANDSHAKE,
            Message::HandshakeAck(_) => message_type::HANDSHAKE_ACK,
            Message::UpdatePayload(_) => message_type::UPDATE_PAYLOAD,
            Message::UpdateResult(_) => message_type::UPDATE_RESULT,
            Message::InspectRequest(_) => message_type::INSPECT_REQUEST,
            Message::InspectResponse(_) => message_type::INSPECT_RESPONSE,
            Message::DebugEvent(_) => message_type::DEBUG_EVENT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Handshake(_) => "Handshake",
            Message::HandshakeAck(_) => "HandshakeAck",
            Message::UpdatePayload(_) => "UpdatePayload",
            Message::UpdateResult(_) => "UpdateResult",
            Message::InspectRequest(_) => "InspectRequest",
            Message::InspectResponse(_) => "InspectResponse",
            Message::DebugEvent(_) => "DebugEvent",
        }
    }

    /// 序列化负载（不含帧头）
    pub fn encode_body(&self) -> ChannelResult<Vec<u8>> {
        let body = match self {
            Message::Handshake(m) => bincode::serialize(m)?,
            Message::HandshakeAck(m) => bincode::serialize(m)?,
            Message::UpdatePayload(m) => bincode::serialize(m)?,
            Message::UpdateResult(m) => bincode::serialize(m)?,
            Message::InspectRequest(m) => bincode::serialize(m)?,
            Message::InspectResponse(m) => bincode::serialize(m)?,
            Message::DebugEvent(m) => bincode::serialize(m)?,
        };
        Ok(body)
    }

    pub fn decode_body(type_byte: u8, body: &[u8]) -> ChannelResult<Self> {
        let message = match type_byte {
            message_type::HANDSHAKE => Message::Handshake(bincode::deserialize(body)?),
            message_type::HANDSHAKE_ACK => Message::HandshakeAck(bincode::deserialize(body)?),
            message_type::UPDATE_PAYLOAD => Message::UpdatePayload(bincode::deserialize(body)?),
            message_type::UPDATE_RESULT => Message::UpdateResult(bincode::deserialize(body)?),
            message_type::INSPECT_REQUEST => Message::InspectRequest(bincode::deserialize(body)?),
            message_type::INSPECT_RESPONSE => Message::InspectResponse(bincode::deserialize(body)?),
            message_type::DEBUG_EVENT => Message::DebugEvent(bincode::deserialize(body)?),
            other => return Err(ChannelError::UnknownMessageType(other)),
        };
        Ok(message)
    }
}
