//! 应用配置文件 (JSON).
//!
//! ```json
//! {
//!   "logging": { "level": "debug", "directory": "logs" },
//!   "player": { "decode_timeout_ms": 15, "prefer_hardware": true }
//! }
//! ```
//!
//! 缺失的段与字段使用默认值.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vdec_player::PlayerOptions;

use crate::logging::LoggingConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub player: PlayerOptions,
}

impl AppConfig {
    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("解析配置文件失败, path={}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
