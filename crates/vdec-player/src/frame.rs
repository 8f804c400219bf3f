//! 解码输出帧.

use bytes::Bytes;
use vdec_core::{VdecError, VdecResult};

/// RGBA8 每像素字节数
const RGBA_BYTES_PER_PIXEL: usize = 4;

/// 输出帧色彩空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// sRGB
    Srgb,
}

/// 解码后的光栅帧 (RGBA8, 紧密排列)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// 显示宽度
    pub width: u32,
    /// 显示高度
    pub height: u32,
    /// 像素数据, 长度为 `width * height * 4`
    pub pixels: Bytes,
    /// 色彩空间
    pub color_space: ColorSpace,
    /// 对应输入数据块的时间戳 (微秒)
    pub timestamp_micros: u64,
}

impl DecodedFrame {
    /// 创建 RGBA8 帧, 校验像素缓冲区长度
    pub fn new_rgba(
        width: u32,
        height: u32,
        pixels: impl Into<Bytes>,
        timestamp_micros: u64,
    ) -> VdecResult<Self> {
        let pixels = pixels.into();
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(RGBA_BYTES_PER_PIXEL))
            .ok_or_else(|| {
                VdecError::InvalidArgument(format!("帧尺寸溢出, {}x{}", width, height))
            })?;
        if pixels.len() != expected {
            return Err(VdecError::InvalidArgument(format!(
                "RGBA 缓冲区长度不匹配, {}x{} 需要 {} 字节, 实际 {} 字节",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
            color_space: ColorSpace::Srgb,
            timestamp_micros,
        })
    }

    /// 每行字节数
    pub fn stride(&self) -> usize {
        self.width as usize * RGBA_BYTES_PER_PIXEL
    }
}
