//! # vdec-core
//!
//! vdec 核心库, 提供统一错误类型与比特流读写工具.
//!
//! H.264 参数集解析依赖按位读取 (MSB first), 测试与基准中构造合成码流依赖按位写入.

pub mod bitreader;
pub mod bitwriter;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{VdecError, VdecResult};
