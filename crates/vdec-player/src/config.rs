//! 解码器配置与会话选项.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vdec_h264::Sps;

/// 默认解码等待上限 (毫秒), 同时约束等锁与等待输出
pub const DEFAULT_DECODE_TIMEOUT_MS: u64 = 15;

/// 默认事件通道容量
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// 硬件加速偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareAcceleration {
    /// 优先使用硬件解码
    PreferHardware,
    /// 由后端自行选择
    NoPreference,
}

impl fmt::Display for HardwareAcceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreferHardware => write!(f, "prefer-hardware"),
            Self::NoPreference => write!(f, "no-preference"),
        }
    }
}

/// 解码器配置
///
/// 应用到后端之后不可修改, 重新协商时整体替换.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderConfig {
    /// RFC 6381 编解码器字符串, 如 `avc1.42C01E`
    pub codec: String,
    /// 编码宽度 (像素)
    pub coded_width: u32,
    /// 编码高度 (像素)
    pub coded_height: u32,
    /// 低延迟模式: 每次提交后无需 flush 即可取得输出
    pub optimize_for_latency: bool,
    /// 硬件加速偏好
    pub hardware_acceleration: HardwareAcceleration,
}

impl DecoderConfig {
    /// 由 SPS 构造候选配置
    pub fn from_sps(sps: &Sps) -> Self {
        Self {
            codec: sps.codec_string(),
            coded_width: sps.width,
            coded_height: sps.height,
            optimize_for_latency: false,
            hardware_acceleration: HardwareAcceleration::NoPreference,
        }
    }

    /// 复制并替换硬件加速偏好
    pub fn with_hardware_acceleration(&self, hardware_acceleration: HardwareAcceleration) -> Self {
        Self {
            hardware_acceleration,
            ..self.clone()
        }
    }
}

impl fmt::Display for DecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(
                f,
                "{} {}x{} ({})",
                self.codec, self.coded_width, self.coded_height, self.hardware_acceleration
            ),
        }
    }
}

/// 解码会话选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    /// 等待解码锁与等待后端输出的上限 (毫秒)
    pub decode_timeout_ms: u64,
    /// 协商时是否先尝试硬件加速
    pub prefer_hardware: bool,
    /// 事件广播通道容量
    pub event_capacity: usize,
}

impl PlayerOptions {
    /// 解码等待上限
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            decode_timeout_ms: DEFAULT_DECODE_TIMEOUT_MS,
            prefer_hardware: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
