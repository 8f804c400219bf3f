//! 后端输出回调.
//!
//! 后端提交数据块后不直接返回结果, 而是稍后通过 [`OutputSink`] 回报输出帧或异步错误.
//! 会话在每次 `decode` 调用中安装一个一次性监听 (`oneshot`), 完成、超时或取消时移除,
//! 监听不会跨调用残留. 监听绑定提交时的时间戳, 超时或跳转后迟到的帧不会交付给之后的调用.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use vdec_core::{VdecError, VdecResult};

use crate::event::{EventEmitter, PlayerEvent};
use crate::frame::DecodedFrame;

type OutputResult = VdecResult<Arc<DecodedFrame>>;

/// 后端输出回调, 可在任意线程调用
#[derive(Debug, Clone)]
pub struct OutputSink {
    inner: Arc<SinkInner>,
}

/// 等待某个时间戳输出的调用
#[derive(Debug)]
struct Waiter {
    timestamp_micros: u64,
    sender: oneshot::Sender<OutputResult>,
}

#[derive(Debug)]
struct SinkInner {
    /// 当前调用安装的一次性监听
    pending: Mutex<Option<Waiter>>,
    /// 最近一次输出的帧
    last_frame: Mutex<Option<Arc<DecodedFrame>>>,
    events: EventEmitter,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OutputSink {
    pub(crate) fn new(events: EventEmitter) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                pending: Mutex::new(None),
                last_frame: Mutex::new(None),
                events,
            }),
        }
    }

    /// 回报一帧输出
    ///
    /// 帧被记为最近输出并广播 `Frame` 事件. 帧的时间戳须与提交的数据块一致,
    /// 只有时间戳与等待中调用相同时才交付给该调用.
    pub fn output(&self, frame: DecodedFrame) {
        let frame = Arc::new(frame);
        *lock(&self.inner.last_frame) = Some(Arc::clone(&frame));
        self.inner.events.emit(PlayerEvent::Frame(Arc::clone(&frame)));

        let mut pending = lock(&self.inner.pending);
        match pending.as_ref().map(|waiter| waiter.timestamp_micros) {
            Some(expected) if expected == frame.timestamp_micros => {
                if let Some(waiter) = pending.take() {
                    let _ = waiter.sender.send(Ok(frame));
                }
            }
            Some(expected) => log::debug!(
                "迟到的输出帧不交付: 时间戳 {}, 等待中的时间戳 {}",
                frame.timestamp_micros,
                expected
            ),
            None => {}
        }
    }

    /// 回报异步解码错误
    ///
    /// 广播 `Error` 事件; 若有调用正在等待, 该调用以错误结束且不再重复上报.
    pub fn error(&self, err: VdecError) {
        self.inner.events.error(err.clone());

        if let Some(waiter) = lock(&self.inner.pending).take() {
            let _ = waiter.sender.send(Err(err));
        }
    }

    /// 为时间戳 `timestamp_micros` 安装本次调用的监听, 替换并丢弃之前残留的监听
    pub(crate) fn install(&self, timestamp_micros: u64) -> oneshot::Receiver<OutputResult> {
        let (sender, rx) = oneshot::channel();
        *lock(&self.inner.pending) = Some(Waiter {
            timestamp_micros,
            sender,
        });
        rx
    }

    /// 移除监听
    pub(crate) fn clear(&self) {
        lock(&self.inner.pending).take();
    }

    /// 是否有调用正在等待输出
    pub(crate) fn has_waiter(&self) -> bool {
        lock(&self.inner.pending).is_some()
    }

    pub(crate) fn last_frame(&self) -> Option<Arc<DecodedFrame>> {
        lock(&self.inner.last_frame).clone()
    }
}
