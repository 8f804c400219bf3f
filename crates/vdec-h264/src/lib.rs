//! # vdec-h264
//!
//! H.264 基本流工具集, 解码会话在数据送入后端之前使用:
//! - [`identify`]: 判定数据块的 NAL 封装格式 (Annex B / 长度前缀)
//! - [`to_annex_b`]: 将长度前缀数据规整为 Annex B
//! - [`nal_units`] / [`find_sps`] / [`is_keyframe`]: 借用式 NAL 枚举
//! - [`parse_sps`]: 解析 SPS 得到 profile/level 与图像尺寸
//!
//! 本 crate 不做任何解码, 只检查码流结构.

pub mod exp_golomb;
pub mod nal;
pub mod sps;
pub mod stream_info;

pub use nal::{
    NalUnit, NalUnitType, NalUnits, START_CODE, escape_rbsp, find_sps, is_keyframe,
    length_prefixed_units, nal_units, remove_emulation_prevention, to_annex_b,
};
pub use sps::{Sps, parse_sps, parse_sps_rbsp, parse_sps_unit};
pub use stream_info::{BoxSize, NaluStreamInfo, identify};
