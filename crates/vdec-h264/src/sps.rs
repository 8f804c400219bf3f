//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! 只解析解码器配置所需的子集:
//! - profile_idc / constraint_set 标志 / level_idc, 组合为 `avc1.PPCCLL` 编解码器字符串
//! - 图像宽高: 以 16 像素宏块为单位, 再按色度采样因子扣除 cropping 偏移
//!
//! 为保证位对齐, High profile 的色度格式、位深与缩放矩阵语法也需完整走过.
//! 解析前必须移除 emulation prevention 字节.

use vdec_core::{BitReader, VdecError, VdecResult};

use crate::exp_golomb::{read_se, read_ue};
use crate::nal::{NalUnit, NalUnitType};

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// profile_idc (编码规格, 如 66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    /// constraint_set0..5 标志与保留位
    pub constraint_set_flags: u8,
    /// level_idc (编码级别, 如 30=3.0, 41=4.1)
    pub level_idc: u8,
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag
    pub separate_colour_plane: bool,
    /// 亮度位深
    pub bit_depth_luma: u32,
    /// 色度位深
    pub bit_depth_chroma: u32,
    /// 最大参考帧数
    pub max_num_ref_frames: u32,
    /// 宽度 (宏块数)
    pub pic_width_in_mbs: u32,
    /// 高度 (map unit 数, 场编码时为半帧)
    pub pic_height_in_map_units: u32,
    /// 是否仅帧编码
    pub frame_mbs_only: bool,
    /// cropping 偏移 (左, 右, 上, 下), 以色度采样单位计
    pub crop: [u32; 4],
    /// 是否存在 VUI 参数
    pub vui_present: bool,
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
}

impl Sps {
    /// RFC 6381 编解码器字符串, 如 `avc1.42C01E`
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02X}{:02X}{:02X}",
            self.profile_idc, self.constraint_set_flags, self.level_idc
        )
    }
}

/// 从 SPS NAL 单元 (含头部字节) 解析
pub fn parse_sps(nal: &[u8]) -> VdecResult<Sps> {
    let unit = NalUnit::parse(nal)?;
    parse_sps_unit(&unit)
}

/// 从已枚举的 NAL 单元解析 SPS
pub fn parse_sps_unit(unit: &NalUnit<'_>) -> VdecResult<Sps> {
    if unit.nal_type != NalUnitType::Sps {
        return Err(VdecError::InvalidArgument(format!(
            "H.264: 期望 SPS, 实际为 {}",
            unit.nal_type
        )));
    }
    parse_sps_rbsp(&unit.rbsp())
}

/// 从 RBSP 数据 (已去除头部与防竞争字节) 解析 SPS
pub fn parse_sps_rbsp(rbsp: &[u8]) -> VdecResult<Sps> {
    if rbsp.len() < 4 {
        return Err(VdecError::Eof);
    }

    let mut br = BitReader::new(rbsp);

    let profile_idc = br.read_bits(8)? as u8;
    let constraint_set_flags = br.read_bits(8)? as u8;
    let level_idc = br.read_bits(8)? as u8;
    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(VdecError::MalformedBitstream(format!(
            "H.264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;

    if has_chroma_format_syntax(profile_idc) {
        chroma_format_idc = read_ue(&mut br)?;
        if chroma_format_idc > 3 {
            return Err(VdecError::MalformedBitstream(format!(
                "H.264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = br.read_flag()?;
        }
        bit_depth_luma = read_bit_depth(&mut br, "luma")?;
        bit_depth_chroma = read_bit_depth(&mut br, "chroma")?;
        if bit_depth_luma > 14 || bit_depth_chroma > 14 {
            return Err(VdecError::MalformedBitstream(format!(
                "H.264: 位深非法, luma={}, chroma={}",
                bit_depth_luma, bit_depth_chroma
            )));
        }
        br.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        if br.read_flag()? {
            // seq_scaling_matrix_present_flag
            let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
            for idx in 0..list_count {
                if br.read_flag()? {
                    skip_scaling_list(&mut br, if idx < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num_minus4 = read_ue(&mut br)?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(VdecError::MalformedBitstream(format!(
            "H.264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }

    let poc_type = read_ue(&mut br)?;
    match poc_type {
        0 => {
            let log2_max_poc_lsb_minus4 = read_ue(&mut br)?;
            if log2_max_poc_lsb_minus4 > 12 {
                return Err(VdecError::MalformedBitstream(format!(
                    "H.264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    log2_max_poc_lsb_minus4
                )));
            }
        }
        1 => {
            br.skip_bits(1)?; // delta_pic_order_always_zero_flag
            read_se(&mut br)?; // offset_for_non_ref_pic
            read_se(&mut br)?; // offset_for_top_to_bottom_field
            let cycle = read_ue(&mut br)?;
            if cycle > 255 {
                return Err(VdecError::MalformedBitstream(format!(
                    "H.264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    cycle
                )));
            }
            for _ in 0..cycle {
                read_se(&mut br)?;
            }
        }
        2 => {}
        _ => {
            return Err(VdecError::MalformedBitstream(format!(
                "H.264: pic_order_cnt_type 非法, value={}",
                poc_type
            )));
        }
    }

    let max_num_ref_frames = read_ue(&mut br)?;
    if max_num_ref_frames > 16 {
        return Err(VdecError::MalformedBitstream(format!(
            "H.264: max_num_ref_frames 超出范围, value={}",
            max_num_ref_frames
        )));
    }
    br.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs = read_minus1(&mut br, "pic_width_in_mbs")?;
    let pic_height_in_map_units = read_minus1(&mut br, "pic_height_in_map_units")?;

    let frame_mbs_only = br.read_flag()?;
    if !frame_mbs_only {
        br.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    br.skip_bits(1)?; // direct_8x8_inference_flag

    let mut crop = [0u32; 4];
    if br.read_flag()? {
        for slot in crop.iter_mut() {
            *slot = read_ue(&mut br)?;
        }
    }

    let vui_present = br.read_flag()?;

    let chroma_array_type = if separate_colour_plane {
        0
    } else {
        chroma_format_idc
    };
    let (width, height) = cropped_dimensions(
        pic_width_in_mbs,
        pic_height_in_map_units,
        frame_mbs_only,
        chroma_array_type,
        crop,
    )?;

    Ok(Sps {
        profile_idc,
        constraint_set_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma,
        bit_depth_chroma,
        max_num_ref_frames,
        pic_width_in_mbs,
        pic_height_in_map_units,
        frame_mbs_only,
        crop,
        vui_present,
        width,
        height,
    })
}

// ============================================================
// 辅助函数
// ============================================================

/// 该 profile 的 SPS 是否携带 chroma_format_idc 等扩展字段
fn has_chroma_format_syntax(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// 读取 bit_depth_*_minus8 并加回 8
fn read_bit_depth(br: &mut BitReader, plane: &str) -> VdecResult<u32> {
    let minus8 = read_ue(br)?;
    minus8.checked_add(8).ok_or_else(|| {
        VdecError::MalformedBitstream(format!(
            "H.264: bit_depth_{}_minus8 超出范围, value={}",
            plane, minus8
        ))
    })
}

/// 读取 `*_minus1` 字段并加回 1
fn read_minus1(br: &mut BitReader, name: &str) -> VdecResult<u32> {
    let minus1 = read_ue(br)?;
    minus1.checked_add(1).ok_or_else(|| {
        VdecError::MalformedBitstream(format!("H.264: {}_minus1 超出范围, value={}", name, minus1))
    })
}

/// 走过一个 scaling_list() 语法结构, 不保留矩阵内容
fn skip_scaling_list(br: &mut BitReader, size: usize) -> VdecResult<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = read_se(br)?;
            // delta_scale 取值范围 [-128, 127]
            if !(-128..=127).contains(&delta_scale) {
                return Err(VdecError::MalformedBitstream(format!(
                    "H.264: delta_scale 超出范围, value={}",
                    delta_scale
                )));
            }
            next_scale = (last_scale + delta_scale).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// cropping 单位 (CropUnitX, CropUnitY)
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let (sub_width, sub_height) = match chroma_array_type {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1), // 单色与 4:4:4
    };
    let field_mult = if frame_mbs_only { 1 } else { 2 };
    (sub_width, sub_height * field_mult)
}

/// 由宏块尺寸与 cropping 计算像素尺寸, 全程无符号检查运算
fn cropped_dimensions(
    width_in_mbs: u32,
    height_in_map_units: u32,
    frame_mbs_only: bool,
    chroma_array_type: u32,
    [left, right, top, bottom]: [u32; 4],
) -> VdecResult<(u32, u32)> {
    let overflow = |what: &str| VdecError::MalformedBitstream(format!("H.264: 计算{}时发生溢出", what));

    let (unit_x, unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let raw_width = width_in_mbs.checked_mul(16).ok_or_else(|| overflow("宽度"))?;
    let raw_height = height_in_map_units
        .checked_mul(if frame_mbs_only { 16 } else { 32 })
        .ok_or_else(|| overflow("高度"))?;
    let crop_x = left
        .checked_add(right)
        .and_then(|v| v.checked_mul(unit_x))
        .ok_or_else(|| overflow("水平裁剪"))?;
    let crop_y = top
        .checked_add(bottom)
        .and_then(|v| v.checked_mul(unit_y))
        .ok_or_else(|| overflow("垂直裁剪"))?;

    if crop_x >= raw_width || crop_y >= raw_height {
        return Err(VdecError::MalformedBitstream(format!(
            "H.264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }

    Ok((raw_width - crop_x, raw_height - crop_y))
}
