//! # vdec
//!
//! 纯 Rust 实现的单路 H.264 解码会话.
//!
//! vdec 负责解码前后的全部调度工作, 实际解码交给外部后端 (硬件或软件):
//! - **码流规整**: 识别 Annex B / 长度前缀封装, 统一转换为 Annex B
//! - **参数解析**: 从 SPS 得到 profile/level 与图像尺寸
//! - **配置协商**: 优先硬件加速, 不支持时回退
//! - **串行调度**: 同一时刻只有一个数据块在后端处理, 等锁超时快速失败
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use vdec::h264::{identify, to_annex_b};
//!
//! let chunk = [0x00, 0x00, 0x00, 0x05, 0x65, 0x88, 0x84, 0x21, 0xA0];
//! let info = identify(&chunk);
//! let annex_b = to_annex_b(&chunk, &info).unwrap();
//! println!("{info}: {} 字节", annex_b.len());
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `vdec-core` | 错误类型与比特流读写 |
//! | `vdec-h264` | 封装识别、Annex B 转换、NAL 枚举、SPS 解析 |
//! | `vdec-player` | 配置协商与解码会话 |

pub mod config;
pub mod logging;

/// 错误类型与比特流读写
pub use vdec_core as core;

/// H.264 码流工具
pub use vdec_h264 as h264;

/// 解码会话
pub use vdec_player as player;

/// 获取 vdec 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
