//! 解码后端抽象.
//!
//! 后端是外部的硬件/软件解码设备: 每次接收一个数据块, 输出经 [`OutputSink`] 异步回报.
//! 方法均取 `&self`, 由实现方负责内部同步.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use vdec_core::VdecResult;

use crate::config::DecoderConfig;
use crate::sink::OutputSink;

/// 后端状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendState {
    /// 未配置
    Unconfigured,
    /// 已配置, 可接收数据
    Configured,
    /// 已关闭, 不可再用
    Closed,
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "unconfigured"),
            Self::Configured => write!(f, "configured"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// 数据块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// 含 IDR 切片, 可独立解码
    Key,
    /// 依赖之前的帧
    Delta,
}

/// 提交给后端的一个数据块 (Annex B)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub chunk_type: ChunkType,
    pub timestamp_micros: u64,
    pub data: Bytes,
}

/// 解码后端
pub trait DecoderBackend: Send + Sync + 'static {
    /// 当前状态
    fn state(&self) -> BackendState;

    /// 查询是否支持该配置 (可能需要访问设备, 因此为异步)
    fn is_config_supported(&self, config: &DecoderConfig) -> impl Future<Output = bool> + Send;

    /// 应用配置, 成功后进入 `Configured`
    fn configure(&self, config: &DecoderConfig) -> VdecResult<()>;

    /// 提交数据块, 输出稍后经 [`OutputSink`] 回报
    fn decode(&self, chunk: EncodedChunk) -> VdecResult<()>;

    /// 丢弃内部缓冲的数据
    fn reset(&self) -> VdecResult<()>;

    /// 释放设备, 进入 `Closed`
    fn close(&self) -> VdecResult<()>;
}

/// 解码后端工厂
pub trait BackendFactory: Send + Sync + 'static {
    type Backend: DecoderBackend;

    /// 运行环境是否允许使用解码设备
    fn context_permitted(&self) -> bool;

    /// 解码能力是否存在
    fn capability_present(&self) -> bool;

    /// 创建新后端, 输出回报到 `sink`
    fn create(&self, sink: OutputSink) -> VdecResult<Self::Backend>;

    /// 本环境能否进行视频解码
    fn is_supported(&self) -> bool {
        self.context_permitted() && self.capability_present()
    }
}
