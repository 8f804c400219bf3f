use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, trace, warn};
use vdec_player::PlayerEvent;

/// 事件对应的日志级别
pub fn event_level(event: &PlayerEvent) -> Level {
    match event {
        PlayerEvent::Error(_) => Level::ERROR,
        PlayerEvent::Warn(_) => Level::WARN,
        PlayerEvent::Debug(_) => Level::DEBUG,
        PlayerEvent::Frame(_) => Level::TRACE,
    }
}

/// 把会话事件转写到 tracing, 事件通道关闭后任务结束
pub fn spawn_event_logger(mut events: broadcast::Receiver<PlayerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("事件接收滞后, 丢弃 {} 条事件", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("会话事件通道已关闭");
    })
}

fn log_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::Error(err) => error!("解码会话错误: {}", err),
        PlayerEvent::Warn(msg) => warn!("{}", msg),
        PlayerEvent::Debug(msg) => debug!("{}", msg),
        PlayerEvent::Frame(frame) => trace!(
            "输出帧 {}x{}, 时间戳 {}",
            frame.width,
            frame.height,
            frame.timestamp_micros
        ),
    }
}
