//! 解码器配置协商.
//!
//! 候选配置先以 prefer-hardware 探测, 不支持时回退到 no-preference.
//! 两者都不支持则协商失败. 低延迟模式总是开启, 这样每次提交后无需 flush.

use vdec_core::{VdecError, VdecResult};

use crate::backend::DecoderBackend;
use crate::config::{DecoderConfig, HardwareAcceleration};

/// 协商出后端可接受的配置
///
/// `prefer_hardware` 为 false 时跳过硬件探测. 本函数只做探测, 不应用配置.
pub async fn negotiate<B: DecoderBackend>(
    backend: &B,
    candidate: &DecoderConfig,
    prefer_hardware: bool,
) -> VdecResult<DecoderConfig> {
    let mut config = candidate.clone();
    config.optimize_for_latency = true;

    if prefer_hardware {
        let hardware = config.with_hardware_acceleration(HardwareAcceleration::PreferHardware);
        if backend.is_config_supported(&hardware).await {
            return Ok(hardware);
        }
        log::warn!("解码后端不支持配置 {}, 改用 no-preference 重试", hardware);
    }

    let fallback = config.with_hardware_acceleration(HardwareAcceleration::NoPreference);
    if backend.is_config_supported(&fallback).await {
        return Ok(fallback);
    }

    Err(VdecError::UnsupportedConfiguration(fallback.to_string()))
}
