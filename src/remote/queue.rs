//! 网络线程到 tick 线程的请求队列
//!
//! 单生产者（活动会话）/单消费者（tick 线程）。每次 tick 排空一次；
//! 同一批中较早的负载如果与较新的负载触及相同的类，会被显式拒绝为 `Superseded`。

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::BTreeSet;
use tokio::sync::oneshot;

use super::protocol::InspectedHandle;
use crate::binding::ClassId;
use crate::core::error::UpdateRejection;
use crate::reflection::{AffectedClasses, UpdatePayload};

pub type UpdateReply = Result<AffectedClasses, UpdateRejection>;

/// 交给 tick 线程的请求
#[derive(Debug)]
pub enum TickRequest {
    Update {
        payload: UpdatePayload,
        reply: oneshot::Sender<UpdateReply>,
    },
    Inspect {
        class: ClassId,
        reply: oneshot::Sender<Vec<InspectedHandle>>,
    },
}

/// 生产端
#[derive(Debug)]
pub struct RequestSender {
    sender: Sender<TickRequest>,
}

/// 消费端
#[derive(Debug)]
pub struct RequestReceiver {
    receiver: Receiver<TickRequest>,
}

pub fn request_queue(capacity: usize) -> (RequestSender, RequestReceiver) {
    let (sender, receiver) = bounded(capacity.max(1));
    (RequestSender { sender }, RequestReceiver { receiver })
}

impl RequestSender {
    /// 提交更新；队列已满或消费端已关闭时回复立即为 `Unavailable`
    pub fn submit_update(&self, payload: UpdatePayload) -> oneshot::Receiver<UpdateReply> {
        let (reply, receiver) = oneshot::channel();
        if let Err(err) = self.sender.try_send(TickRequest::Update { payload, reply }) {
            let request = match err {
                TrySendError::Full(request) | TrySendError::Disconnected(request) => request,
            };
            if let TickRequest::Update { reply, .. } = request {
                let _ = reply.send(Err(UpdateRejection::Unavailable));
            }
        }
        receiver
    }

    /// 提交检视请求；无法送达时回复通道直接关闭
    pub fn submit_inspect(&self, class: ClassId) -> oneshot::Receiver<Vec<InspectedHandle>> {
        let (reply, receiver) = oneshot::channel();
        let _ = self.sender.try_send(TickRequest::Inspect { class, reply });
        receiver
    }
}

impl RequestReceiver {
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// 取出当前所有请求，并拒绝被后来者取代的更新
    ///
    /// 返回 (存活的请求, 被取代的更新数)。
    pub fn drain(&self) -> (Vec<TickRequest>, usize) {
        let requests: Vec<TickRequest> = self.receiver.try_iter().collect();

        let mut later: BTreeSet<ClassId> = BTreeSet::new();
        let mut kept = Vec::with_capacity(requests.len());
        let mut superseded = 0;

        for request in requests.into_iter().rev() {
            match request {
                TickRequest::Update { payload, reply } => {
                    let touched = payload.touched_classes();
                    let overlap = touched.intersection(&later).next().cloned();
                    later.extend(touched);
                    match overlap {
                        Some(class) => {
                            superseded += 1;
                            tracing::info!(
                                target: "remote",
                                class = %class,
                                "Pending update superseded by a newer payload"
                            );
                            let _ = reply.send(Err(UpdateRejection::Superseded {
                                class_name: class.to_string(),
                            }));
                        }
                        None => kept.push(TickRequest::Update { payload, reply }),
                    }
                }
                inspect => kept.push(inspect),
            }
        }

        kept.reverse();
        (kept, superseded)
    }
}
