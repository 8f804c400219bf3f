//! 会话事件.
//!
//! 事件经 `tokio::sync::broadcast` 分发, 订阅者各自持有接收端.
//! 没有订阅者时事件直接丢弃, 发送方不阻塞.

use std::sync::Arc;

use tokio::sync::broadcast;
use vdec_core::VdecError;

use crate::frame::DecodedFrame;

/// 会话事件
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// 后端输出一帧
    Frame(Arc<DecodedFrame>),
    /// 配置变化、后端重建、取消等调试信息
    Debug(String),
    /// 可恢复的异常 (超时)
    Warn(String),
    /// 后端故障、协商失败、码流封装错误
    Error(VdecError),
}

/// 事件发送端
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventEmitter {
    /// 创建事件通道, 容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// 发送事件
    pub fn emit(&self, event: PlayerEvent) {
        // 无订阅者时 send 返回错误, 忽略
        let _ = self.tx.send(event);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(PlayerEvent::Debug(message.into()));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(PlayerEvent::Warn(message.into()));
    }

    pub fn error(&self, err: VdecError) {
        self.emit(PlayerEvent::Error(err));
    }
}
