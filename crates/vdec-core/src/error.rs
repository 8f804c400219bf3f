//! 统一错误类型定义.
//!
//! 所有 vdec crate 共用的错误类型. 解码会话对外从不返回错误,
//! 而是把这些错误转换为"无帧"结果加事件通知, 因此错误类型需要可克隆.

use thiserror::Error;

/// vdec 统一错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VdecError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 码流结构错误 (NAL 长度越界、SPS 字段非法等)
    #[error("码流格式错误: {0}")]
    MalformedBitstream(String),

    /// 已到达数据末尾 (码流被截断)
    #[error("已到达数据末尾")]
    Eof,

    /// 硬件与软件配置均不被后端支持
    #[error("解码器不支持该配置: {0}")]
    UnsupportedConfiguration(String),

    /// 等待解码锁或等待后端输出超时
    #[error("解码超时: {0}")]
    DecodeTimeout(String),

    /// 后端拒绝或解码失败
    #[error("解码后端错误: {0}")]
    BackendFault(String),

    /// 后端资源已关闭
    #[error("解码后端已关闭")]
    ResourceClosed,

    /// 等待被 seek 或关闭取消
    #[error("解码已取消")]
    Cancelled,

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl VdecError {
    /// 是否为码流截断 (数据不足) 类错误
    ///
    /// 截断的参数集只说明数据还不完整, 调用方应继续等待后续数据.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/// vdec 统一 Result 类型
pub type VdecResult<T> = Result<T, VdecError>;
