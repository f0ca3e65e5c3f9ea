//! Live Update Channel
//!
//! 外部开发环境与运行中进程之间的请求/响应加推送协议：
//! 握手校验协议版本和绑定表校验和，然后接受增量编译的脚本负载，
//! 交给 tick 线程原子地应用并报告结果。
//!
//! - [`protocol`]：消息定义
//! - [`codec`]：`[u32 长度][u8 类型][负载]` 帧编解码
//! - [`session`]：每个连接的状态机
//! - [`queue`]：网络线程到 tick 线程的请求队列
//! - [`server`]：监听与会话循环
//! - [`client`]：工具侧客户端

pub mod client;
pub mod codec;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod session;

pub use client::RemoteClient;
pub use protocol::{
    DebugEvent, DebugEventKind, Handshake, HandshakeAck, InspectRequest, InspectResponse,
    InspectedHandle, Message, UpdateResult, PROTOCOL_VERSION,
};
pub use queue::{request_queue, RequestReceiver, RequestSender, TickRequest};
pub use server::LiveUpdateServer;
pub use session::{Session, SessionAction, SessionState};
