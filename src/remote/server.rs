//! 实时更新服务器
//!
//! 在独立线程上运行一个单线程 Tokio 运行时。同一时间只服务一个工具会话，
//! 连接按顺序处理，因此请求队列始终只有一个生产者。
//!
//! ## 架构设计
//!
//! ```text
//! ┌──────────────┐  frames  ┌──────────────────────────┐  TickRequest  ┌─────────────┐
//! │ External IDE │◄────────►│ live-update thread       │──────────────►│ tick thread │
//! │              │          │  accept → Session loop   │◄──────────────│ BridgeRuntime│
//! └──────────────┘          └──────────────────────────┘   oneshot     └─────────────┘
//! ```

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};

use super::codec::{read_frame, write_frame};
use super::protocol::{DebugEvent, InspectResponse, Message, UpdateResult};
use super::queue::RequestSender;
use super::session::{Session, SessionAction};
use crate::config::ChannelConfig;
use crate::core::error::{ChannelError, ChannelResult, UpdateRejection};

/// 会话共享的只读设置
struct ServerContext {
    checksum: String,
    max_frame_bytes: usize,
    handshake_timeout: Duration,
    payload_timeout: Duration,
    requests: RequestSender,
    events: broadcast::Sender<DebugEvent>,
}

/// 运行中的实时更新服务器；`stop` 或析构时关闭
pub struct LiveUpdateServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl LiveUpdateServer {
    /// 绑定监听地址并启动服务线程
    pub fn start(
        config: &ChannelConfig,
        checksum: String,
        requests: RequestSender,
        events: broadcast::Sender<DebugEvent>,
    ) -> ChannelResult<Self> {
        let listener = std::net::TcpListener::bind(config.bind_address())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let context = ServerContext {
            checksum,
            max_frame_bytes: config.max_frame_bytes,
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            payload_timeout: Duration::from_millis(config.payload_timeout_ms),
            requests,
            events,
        };

        let thread = thread::Builder::new()
            .name("live-update".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    match TcpListener::from_std(listener) {
                        Ok(listener) => accept_loop(listener, context, shutdown_rx).await,
                        Err(e) => {
                            tracing::error!(target: "remote", error = %e, "Failed to register listener")
                        }
                    }
                });
            })?;

        tracing::info!(target: "remote", address = %local_addr, "Live update channel listening");
        Ok(Self {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// 停止服务并等待线程退出；未完成的请求回复为 `Unavailable`
    pub fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(target: "remote", "Live update thread panicked");
            }
            tracing::info!(target: "remote", address = %self.local_addr, "Live update channel stopped");
        }
    }
}

impl Drop for LiveUpdateServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 等待关闭信号；信号已经发出时立即返回
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn accept_loop(listener: TcpListener, context: ServerContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(target: "remote", error = %e, "Accept failed");
                    continue;
                }
            },
        };

        let session_id: u64 = rand::random();
        tracing::info!(target: "remote", session_id, %peer, "Tool connected");
        match serve_connection(stream, &context, &mut shutdown).await {
            Ok(()) => tracing::info!(target: "remote", session_id, %peer, "Tool disconnected"),
            Err(e) => tracing::warn!(target: "remote", session_id, %peer, error = %e, "Session ended"),
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    context: &ServerContext,
    shutdown: &mut watch::Receiver<bool>,
) -> ChannelResult<()> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();
    let mut session = Session::new(context.checksum.clone());
    session.connect();

    let first = tokio::time::timeout(
        context.handshake_timeout,
        read_frame(&mut reader, context.max_frame_bytes, context.payload_timeout),
    )
    .await
    .map_err(|_| ChannelError::Timeout("handshake".to_string()))??;
    let Some(first) = first else {
        return Ok(());
    };

    match session.on_message(first)? {
        SessionAction::Reply(ack) => write_frame(&mut writer, &ack).await?,
        SessionAction::Refuse(ack) => {
            write_frame(&mut writer, &ack).await?;
            let reason = match &ack {
                Message::HandshakeAck(ack) => ack
                    .reason
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                _ => String::new(),
            };
            return Err(ChannelError::HandshakeRefused(reason));
        }
        _ => return Err(ChannelError::ProtocolViolation("expected handshake".to_string())),
    }

    // 读取放在独立任务中，主循环只在可取消的通道上等待
    let (frames_tx, mut frames) = mpsc::channel(4);
    let max_frame_bytes = context.max_frame_bytes;
    let payload_timeout = context.payload_timeout;
    let reader_task = tokio::spawn(async move {
        loop {
            let frame = read_frame(&mut reader, max_frame_bytes, payload_timeout).await;
            let done = !matches!(frame, Ok(Some(_)));
            if frames_tx.send(frame).await.is_err() || done {
                break;
            }
        }
    });

    let mut events = context.events.subscribe();
    let result = loop {
        tokio::select! {
            _ = shutdown_requested(shutdown) => break Ok(()),
            frame = frames.recv() => {
                let message = match frame {
                    Some(Ok(Some(message))) => message,
                    Some(Ok(None)) | None => break Ok(()),
                    Some(Err(e)) => break Err(e),
                };
                match handle_message(&mut session, message, context, &mut writer, shutdown).await {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(e) = write_frame(&mut writer, &Message::DebugEvent(event)).await {
                        break Err(e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(target: "remote", skipped, "Dropped debug events for slow tool");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
        }
    };

    reader_task.abort();
    session.close();
    result
}

/// 处理一条空闲状态下的消息；返回 `false` 表示应结束会话
async fn handle_message(
    session: &mut Session,
    message: Message,
    context: &ServerContext,
    writer: &mut OwnedWriteHalf,
    shutdown: &mut watch::Receiver<bool>,
) -> ChannelResult<bool> {
    match session.on_message(message)? {
        SessionAction::Apply(payload) => {
            let classes = payload.classes.len();
            let removed = payload.removed.len();
            let reply = context.requests.submit_update(payload);
            let outcome = tokio::select! {
                _ = shutdown_requested(shutdown) => return Ok(false),
                outcome = reply => outcome.unwrap_or(Err(UpdateRejection::Unavailable)),
            };
            let result = UpdateResult::from(outcome);
            tracing::info!(
                target: "remote",
                classes,
                removed,
                accepted = result.accepted,
                generation = result.generation,
                "Update payload processed"
            );
            let reply = session.on_update_result(result)?;
            write_frame(writer, &reply).await?;
        }
        SessionAction::Inspect(class) => {
            let reply = context.requests.submit_inspect(class.clone());
            let handles = tokio::select! {
                _ = shutdown_requested(shutdown) => return Ok(false),
                handles = reply => handles.unwrap_or_default(),
            };
            write_frame(writer, &Message::InspectResponse(InspectResponse { class, handles })).await?;
        }
        SessionAction::Reply(message) => write_frame(writer, &message).await?,
        SessionAction::Refuse(message) => {
            write_frame(writer, &message).await?;
            return Ok(false);
        }
    }
    Ok(true)
}
