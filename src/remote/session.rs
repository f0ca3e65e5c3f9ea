//! 连接状态机
//!
//! ```text
//! Disconnected ─connect─► Handshaking ─ack─► Idle ⇄ Applying
//!                              │               │
//!                              └──refuse───────┴──► Disconnected
//! ```
//!
//! 状态机本身不做 I/O，服务器按它返回的动作读写连接。

use super::protocol::{HandshakeAck, Message, UpdateResult, PROTOCOL_VERSION};
use crate::binding::ClassId;
use crate::core::error::{ChannelError, ChannelResult, UpdateRejection};
use crate::reflection::UpdatePayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Idle,
    Applying,
}

/// 收到一条消息后服务器要做的事
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// 发送回复，保持连接
    Reply(Message),
    /// 发送回复后关闭连接
    Refuse(Message),
    /// 把负载交给 tick 线程应用
    Apply(UpdatePayload),
    /// 向 tick 线程查询某个类的存活句柄
    Inspect(ClassId),
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    checksum: String,
}

impl Session {
    /// `checksum` 是运行时当前绑定表的校验和
    pub fn new(checksum: impl Into<String>) -> Self {
        Self {
            state: SessionState::Disconnected,
            checksum: checksum.into(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connect(&mut self) {
        self.state = SessionState::Handshaking;
    }

    pub fn close(&mut self) {
        self.state = SessionState::Disconnected;
    }

    pub fn on_message(&mut self, message: Message) -> ChannelResult<SessionAction> {
        match (self.state, message) {
            (SessionState::Handshaking, Message::Handshake(handshake)) => {
                let refusal = if handshake.version != PROTOCOL_VERSION {
                    Some(UpdateRejection::VersionMismatch {
                        expected: PROTOCOL_VERSION,
                        found: handshake.version,
                    })
                } else if handshake.checksum != self.checksum {
                    Some(UpdateRejection::ChecksumMismatch {
                        expected: self.checksum.clone(),
                        found: handshake.checksum,
                    })
                } else {
                    None
                };

                match refusal {
                    Some(reason) => {
                        self.state = SessionState::Disconnected;
                        Ok(SessionAction::Refuse(Message::HandshakeAck(HandshakeAck::refuse(reason))))
                    }
                    None => {
                        self.state = SessionState::Idle;
                        Ok(SessionAction::Reply(Message::HandshakeAck(HandshakeAck::accept())))
                    }
                }
            }
            (SessionState::Idle, Message::UpdatePayload(payload)) => {
                self.state = SessionState::Applying;
                Ok(SessionAction::Apply(payload))
            }
            (SessionState::Idle, Message::InspectRequest(request)) => {
                Ok(SessionAction::Inspect(request.class))
            }
            (state, message) => {
                self.state = SessionState::Disconnected;
                Err(ChannelError::ProtocolViolation(format!(
                    "unexpected {} while {:?}",
                    message.name(),
                    state
                )))
            }
        }
    }

    /// 应用完成，返回 Idle
    pub fn on_update_result(&mut self, result: UpdateResult) -> ChannelResult<Message> {
        if self.state != SessionState::Applying {
            return Err(ChannelError::ProtocolViolation(format!(
                "update result while {:?}",
                self.state
            )));
        }
        self.state = SessionState::Idle;
        Ok(Message::UpdateResult(result))
    }
}
