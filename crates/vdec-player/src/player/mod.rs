//! 单路 H.264 解码会话.
//!
//! [`VideoPlayer`] 串行化所有 `decode` 调用, 保证任一时刻最多一个数据块在后端处理中.
//! 解码锁的获取有时间上限 (默认 15 ms): 前一次解码卡住时, 新调用快速失败并上报 `Warn`,
//! 而不是无限排队. `reset_for_seek` / `close` 递增取消代数, 正在等锁或等待输出的调用
//! 立即以 `None` 返回.
//!
//! # 状态流转
//! ```text
//! Unconfigured --(SPS + 协商成功)--> Configured
//! Configured   --reset_for_seek-->   后端复位, 配置与封装信息保留, 下次解码直接重新应用配置
//! 任意状态     --close-->            后端释放, 配置与封装信息清空, 下次解码重建后端并重新协商
//! ```

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;
use vdec_core::{VdecError, VdecResult};
use vdec_h264::{
    NaluStreamInfo, find_sps, identify, is_keyframe, nal_units, parse_sps_unit, to_annex_b,
};

use crate::backend::{BackendFactory, BackendState, ChunkType, DecoderBackend, EncodedChunk};
use crate::config::{DecoderConfig, PlayerOptions};
use crate::event::{EventEmitter, PlayerEvent};
use crate::frame::DecodedFrame;
use crate::negotiate::negotiate;
use crate::sink::OutputSink;

#[cfg(test)]
mod tests;

/// 受解码锁保护之外、可被非阻塞访问器读取的会话状态
#[derive(Debug)]
struct SessionState {
    /// 码流封装信息, 识别成功后保持到 `close`
    stream_info: NaluStreamInfo,
    /// 已应用的解码器配置
    config: Option<DecoderConfig>,
    /// 最近一次成功提交的时间戳 (微秒)
    last_submitted_timestamp: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            stream_info: NaluStreamInfo::Unknown,
            config: None,
            last_submitted_timestamp: 0,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 单路 H.264 解码会话
pub struct VideoPlayer<F: BackendFactory> {
    factory: F,
    options: PlayerOptions,
    events: EventEmitter,
    sink: OutputSink,
    /// 当前后端, 关闭后在下次解码时重建
    backend: Mutex<Option<Arc<F::Backend>>>,
    session: Mutex<SessionState>,
    /// 解码锁 (FIFO)
    decode_lock: tokio::sync::Mutex<()>,
    /// 取消代数
    cancel: watch::Sender<u64>,
}

impl<F: BackendFactory> VideoPlayer<F> {
    /// 创建会话, 后端在第一次解码时创建
    pub fn new(factory: F, options: PlayerOptions) -> Self {
        let events = EventEmitter::new(options.event_capacity);
        let sink = OutputSink::new(events.clone());
        let (cancel, _) = watch::channel(0);

        Self {
            factory,
            options,
            events,
            sink,
            backend: Mutex::new(None),
            session: Mutex::new(SessionState::default()),
            decode_lock: tokio::sync::Mutex::new(()),
            cancel,
        }
    }

    /// 本环境能否进行视频解码
    pub fn is_supported(factory: &F) -> bool {
        factory.is_supported()
    }

    /// 订阅会话事件
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    /// 后端是否已配置, 可以直接解码
    pub fn is_initialized(&self) -> bool {
        self.current_backend()
            .is_some_and(|backend| backend.state() == BackendState::Configured)
    }

    /// 已应用的解码器配置
    pub fn decoder_config(&self) -> Option<DecoderConfig> {
        lock(&self.session).config.clone()
    }

    /// 已识别的码流封装信息
    pub fn stream_info(&self) -> NaluStreamInfo {
        lock(&self.session).stream_info
    }

    /// 最近一次后端输出的帧
    pub fn last_frame(&self) -> Option<Arc<DecodedFrame>> {
        self.sink.last_frame()
    }

    pub fn last_submitted_timestamp(&self) -> u64 {
        lock(&self.session).last_submitted_timestamp
    }

    /// 解码一个数据块
    ///
    /// 返回与本次提交对应的输出帧. 以下情况返回 `None` 且不会 panic:
    /// - 尚未收到 SPS, 或配置协商失败
    /// - 数据块只含参数集, 提交后不等待输出
    /// - 等锁或等待输出超过上限 (`Warn`)
    /// - 后端报错 (`Error`)
    /// - 期间调用了 `reset_for_seek` / `close` (`Debug`)
    pub async fn decode(&self, chunk: &[u8], timestamp_micros: u64) -> Option<Arc<DecodedFrame>> {
        let mut cancelled = self.cancel.subscribe();
        let timeout = self.options.decode_timeout();

        let _guard = tokio::select! {
            biased;
            _ = cancelled.changed() => {
                self.report(VdecError::Cancelled, timestamp_micros);
                return None;
            }
            acquired = tokio::time::timeout(timeout, self.decode_lock.lock()) => match acquired {
                Ok(guard) => guard,
                Err(_) => {
                    self.report(
                        VdecError::DecodeTimeout(format!(
                            "等待解码锁超过 {} ms, 丢弃 {} 字节数据块 (时间戳 {})",
                            self.options.decode_timeout_ms,
                            chunk.len(),
                            timestamp_micros
                        )),
                        timestamp_micros,
                    );
                    return None;
                }
            },
        };

        match self
            .decode_exclusive(chunk, timestamp_micros, &mut cancelled)
            .await
        {
            Ok(frame) => frame,
            Err(err) => {
                self.report(err, timestamp_micros);
                None
            }
        }
    }

    /// 为跳转复位: 丢弃后端缓冲, 保留配置与封装信息, 取消等待中的调用
    pub fn reset_for_seek(&self) {
        if let Some(backend) = self.current_backend() {
            if backend.state() == BackendState::Configured {
                if let Err(err) = backend.reset() {
                    log::warn!("复位解码后端失败: {}", err);
                }
            }
        }
        self.cancel_pending();
    }

    /// 关闭会话: 释放后端, 清空配置与封装信息, 取消等待中的调用
    ///
    /// 可重复调用. 之后的 `decode` 会重建后端并从新的 SPS 重新协商.
    pub fn close(&self) {
        if let Some(backend) = self.current_backend() {
            if backend.state() != BackendState::Closed {
                if let Err(err) = backend.close() {
                    log::warn!("关闭解码后端失败: {}", err);
                }
            }
        }

        {
            let mut session = lock(&self.session);
            session.stream_info = NaluStreamInfo::Unknown;
            session.config = None;
        }
        self.cancel_pending();
    }

    // ========================================================
    // 内部实现
    // ========================================================

    /// 持有解码锁时执行的解码流程
    async fn decode_exclusive(
        &self,
        chunk: &[u8],
        timestamp_micros: u64,
        cancelled: &mut watch::Receiver<u64>,
    ) -> VdecResult<Option<Arc<DecodedFrame>>> {
        let backend = self.backend_handle()?;
        let info = self.resolve_stream_info(chunk);
        let annex_b = to_annex_b(chunk, &info)?;

        if backend.state() != BackendState::Configured
            && !self.ensure_configured(&backend, &annex_b, cancelled).await?
        {
            return Ok(None);
        }

        let has_picture = nal_units(&annex_b).any(|unit| unit.nal_type.is_vcl());
        let chunk_type = if is_keyframe(&annex_b) {
            ChunkType::Key
        } else {
            ChunkType::Delta
        };
        let data = match annex_b {
            Cow::Owned(buf) => Bytes::from(buf),
            Cow::Borrowed(buf) => Bytes::copy_from_slice(buf),
        };
        let byte_len = data.len();

        // 后端可能在 decode() 内同步回报输出, 监听必须先于提交安装
        let output = has_picture.then(|| self.sink.install(timestamp_micros));
        let submitted = backend.decode(EncodedChunk {
            chunk_type,
            timestamp_micros,
            data,
        });
        if let Err(err) = submitted {
            self.sink.clear();
            return Err(match err {
                VdecError::BackendFault(msg) => VdecError::BackendFault(format!(
                    "提交 {} 字节数据块失败 (时间戳 {}): {}",
                    byte_len, timestamp_micros, msg
                )),
                other => other,
            });
        }
        lock(&self.session).last_submitted_timestamp = timestamp_micros;
        log::trace!(
            "已提交 {:?} 数据块, {} 字节, 时间戳 {}",
            chunk_type,
            byte_len,
            timestamp_micros
        );

        // 只含参数集的数据块不会产生输出
        let Some(output) = output else {
            return Ok(None);
        };

        let timeout = self.options.decode_timeout();
        let result = tokio::select! {
            biased;
            _ = cancelled.changed() => Err(VdecError::Cancelled),
            received = tokio::time::timeout(timeout, output) => match received {
                Ok(Ok(Ok(frame))) => Ok(Some(frame)),
                Ok(Ok(Err(err))) => {
                    // OutputSink 已广播 Error 事件
                    log::debug!("后端异步报错, 时间戳 {}: {}", timestamp_micros, err);
                    Ok(None)
                }
                Ok(Err(_)) => Err(VdecError::Cancelled),
                Err(_) => Err(VdecError::DecodeTimeout(format!(
                    "等待解码输出超过 {} ms, {} 字节数据块 (时间戳 {})",
                    self.options.decode_timeout_ms, byte_len, timestamp_micros
                ))),
            },
        };
        self.sink.clear();
        result
    }

    /// 确保后端已配置, 返回 false 表示本数据块无法完成配置
    async fn ensure_configured(
        &self,
        backend: &F::Backend,
        annex_b: &[u8],
        cancelled: &mut watch::Receiver<u64>,
    ) -> VdecResult<bool> {
        // 后端复位后回到未配置状态, 已协商过的配置直接重新应用
        let applied = lock(&self.session).config.clone();
        if let Some(config) = applied {
            backend.configure(&config)?;
            self.events.debug(format!("重新应用解码器配置 {}", config));
            return Ok(true);
        }

        let Some(unit) = find_sps(annex_b) else {
            log::trace!("数据块不含 SPS, 等待关键帧");
            return Ok(false);
        };
        let sps = parse_sps_unit(&unit)?;
        let candidate = DecoderConfig::from_sps(&sps);

        let config = tokio::select! {
            biased;
            _ = cancelled.changed() => return Err(VdecError::Cancelled),
            negotiated = negotiate(backend, &candidate, self.options.prefer_hardware) => negotiated?,
        };

        self.events.debug(format!("配置解码器 {}", config));
        backend.configure(&config)?;
        lock(&self.session).config = Some(config);
        Ok(true)
    }

    /// 当前后端; 不存在或已关闭时通过工厂新建
    fn backend_handle(&self) -> VdecResult<Arc<F::Backend>> {
        let mut slot = lock(&self.backend);
        if let Some(backend) = slot.as_ref() {
            if backend.state() != BackendState::Closed {
                return Ok(Arc::clone(backend));
            }
        }

        let recreated = slot.is_some();
        let backend = Arc::new(self.factory.create(self.sink.clone())?);
        *slot = Some(Arc::clone(&backend));
        drop(slot);

        if recreated {
            self.events.debug("解码后端已关闭, 创建新的后端实例");
        }
        Ok(backend)
    }

    fn current_backend(&self) -> Option<Arc<F::Backend>> {
        lock(&self.backend).clone()
    }

    /// 识别码流封装, 结论确定后缓存; 未识别的数据块原样透传, 下次继续探测
    fn resolve_stream_info(&self, chunk: &[u8]) -> NaluStreamInfo {
        let mut session = lock(&self.session);
        if session.stream_info.is_known() {
            return session.stream_info;
        }

        let info = identify(chunk);
        if info.is_known() {
            session.stream_info = info;
            drop(session);
            self.events.debug(format!("码流封装识别为 {}", info));
        }
        info
    }

    fn cancel_pending(&self) {
        self.cancel.send_modify(|generation| *generation = generation.wrapping_add(1));
        self.sink.clear();
    }

    /// 按错误类别转为事件
    fn report(&self, err: VdecError, timestamp_micros: u64) {
        match err {
            VdecError::DecodeTimeout(msg) => self.events.warn(msg),
            VdecError::Cancelled => self
                .events
                .debug(format!("会话已复位或关闭, 放弃时间戳 {} 的解码", timestamp_micros)),
            VdecError::Eof => self
                .events
                .debug(format!("时间戳 {} 的 SPS 不完整, 等待后续数据块", timestamp_micros)),
            VdecError::ResourceClosed => self.events.debug("解码后端已关闭, 下次解码时重建"),
            other => {
                log::debug!("时间戳 {} 解码失败: {}", timestamp_micros, other);
                self.events.error(other);
            }
        }
    }
}
