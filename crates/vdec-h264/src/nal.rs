//! H.264 NAL (Network Abstraction Layer) 单元枚举与封装转换.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! 解码后端只接受 Annex B 码流, 因此长度前缀数据在送入后端前需经
//! [`to_annex_b`] 转换. 枚举得到的 [`NalUnit`] 借用源缓冲区, 不复制数据.

use std::borrow::Cow;

use byteorder::{BigEndian, ByteOrder};
use vdec_core::{VdecError, VdecResult};

use crate::stream_info::NaluStreamInfo;

/// 4 字节 Annex B 起始码
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A
    SliceDpa,
    /// 数据分区 B
    SliceDpb,
    /// 数据分区 C
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// SPS 扩展
    SpsExtension,
    /// 其他类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            _ => Self::Unknown(type_id),
        }
    }

    /// 类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为关键帧 (IDR)
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::SpsExtension => write!(f, "SPSExt"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// NAL 单元视图 (借用源缓冲区)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// NAL 单元数据 (不含起始码/长度前缀, 含头部字节)
    pub data: &'a [u8],
}

impl<'a> NalUnit<'a> {
    /// 从 NAL 数据 (含头部字节) 解析
    pub fn parse(data: &'a [u8]) -> VdecResult<Self> {
        let Some(&header) = data.first() else {
            return Err(VdecError::MalformedBitstream(
                "H.264: NAL 单元数据为空".into(),
            ));
        };
        if header & 0x80 != 0 {
            return Err(VdecError::MalformedBitstream(format!(
                "H.264: forbidden_zero_bit 非法, header=0x{:02X}",
                header
            )));
        }

        Ok(Self {
            nal_type: NalUnitType::from_type_id(header & 0x1F),
            ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    /// 头部之后的负载 (仍含 emulation prevention 字节)
    pub fn payload(&self) -> &'a [u8] {
        &self.data[1..]
    }

    /// RBSP (Raw Byte Sequence Payload): 去掉头部字节与 emulation prevention 字节
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(self.payload())
    }
}

/// Annex B NAL 单元迭代器
///
/// 惰性扫描起始码, 每次 `next` 只前进到下一个起始码. 迭代器可克隆,
/// 对同一缓冲区重新调用 [`nal_units`] 即可从头开始.
#[derive(Debug, Clone)]
pub struct NalUnits<'a> {
    data: &'a [u8],
    /// 下一次扫描的起点
    pos: usize,
}

/// 枚举 Annex B 缓冲区中的 NAL 单元
///
/// 支持 3 字节和 4 字节起始码. 空单元与 forbidden_zero_bit 置位的单元被跳过,
/// 下一个起始码之前的尾随 0 字节被去除.
pub fn nal_units(data: &[u8]) -> NalUnits<'_> {
    NalUnits { data, pos: 0 }
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = NalUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, nal_start) = find_start_code(self.data, self.pos)?;
            let nal_end = match find_start_code(self.data, nal_start) {
                Some((next, _)) => next,
                None => self.data.len(),
            };
            self.pos = nal_end;

            let mut end = nal_end;
            while end > nal_start && self.data[end - 1] == 0x00 {
                end -= 1;
            }
            if end == nal_start {
                continue;
            }

            match NalUnit::parse(&self.data[nal_start..end]) {
                Ok(unit) => return Some(unit),
                Err(err) => log::trace!("跳过非法 NAL 单元: {}", err),
            }
        }
    }
}

/// 长度前缀 NAL 单元迭代器
///
/// 结构错误 (长度字段截断、长度越界) 作为 `Err` 产出一次后迭代结束.
#[derive(Debug, Clone)]
pub struct LengthPrefixedUnits<'a> {
    data: &'a [u8],
    box_size: usize,
    pos: usize,
    failed: bool,
}

/// 枚举长度前缀缓冲区中的 NAL 单元, `box_size` 为 1/2/4
pub fn length_prefixed_units(data: &[u8], box_size: usize) -> LengthPrefixedUnits<'_> {
    LengthPrefixedUnits {
        data,
        box_size,
        pos: 0,
        failed: false,
    }
}

impl<'a> LengthPrefixedUnits<'a> {
    fn read_unit(&mut self) -> VdecResult<NalUnit<'a>> {
        if !matches!(self.box_size, 1 | 2 | 4) {
            return Err(VdecError::InvalidArgument(format!(
                "H.264: 长度前缀字节数非法, box_size={}",
                self.box_size
            )));
        }

        let remain = self.data.len() - self.pos;
        if remain < self.box_size {
            return Err(VdecError::MalformedBitstream(format!(
                "H.264: NAL 长度字段截断, offset={}, remain={}",
                self.pos, remain
            )));
        }

        let prefix = &self.data[self.pos..self.pos + self.box_size];
        let nal_len = match self.box_size {
            1 => usize::from(prefix[0]),
            2 => usize::from(BigEndian::read_u16(prefix)),
            _ => BigEndian::read_u32(prefix) as usize,
        };
        let nal_start = self.pos + self.box_size;
        if nal_len > self.data.len() - nal_start {
            return Err(VdecError::MalformedBitstream(format!(
                "H.264: NAL 长度越界, offset={}, declared_len={}, remain={}",
                self.pos,
                nal_len,
                self.data.len() - nal_start
            )));
        }

        self.pos = nal_start + nal_len;
        NalUnit::parse(&self.data[nal_start..nal_start + nal_len])
    }
}

impl<'a> Iterator for LengthPrefixedUnits<'a> {
    type Item = VdecResult<NalUnit<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let item = self.read_unit();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// 将数据块规整为 Annex B 格式
///
/// packet 格式逐个改写为 `00 00 00 01` + NAL 数据; Annex B 与未识别格式原样返回,
/// 后端原生即为 Annex B.
pub fn to_annex_b<'a>(data: &'a [u8], info: &NaluStreamInfo) -> VdecResult<Cow<'a, [u8]>> {
    let Some(box_size) = info.box_size() else {
        return Ok(Cow::Borrowed(data));
    };

    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + START_CODE.len());
    for unit in length_prefixed_units(data, box_size) {
        let unit = unit?;
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(unit.data);
    }
    Ok(Cow::Owned(out))
}

/// 查找第一个 SPS 单元
pub fn find_sps(data: &[u8]) -> Option<NalUnit<'_>> {
    nal_units(data).find(|unit| unit.nal_type == NalUnitType::Sps)
}

/// 数据块是否包含 IDR 切片
pub fn is_keyframe(data: &[u8]) -> bool {
    nal_units(data).any(|unit| unit.nal_type.is_idr())
}

/// 移除 emulation prevention 字节 (`00 00 03` → `00 00`)
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        rbsp.push(byte);
    }

    rbsp
}

/// 插入 emulation prevention 字节, 使 RBSP 可以安全放入 NAL 单元
///
/// 任何 `00 00` 之后若跟随 `<= 0x03` 的字节, 在其前插入 `0x03`.
pub fn escape_rbsp(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64 + 1);
    let mut zeros = 0usize;

    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        out.push(byte);
    }

    out
}

/// 从 `from` 开始查找起始码, 返回 (起始码位置, NAL 数据起始位置)
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                return Some((i, i + 3));
            }
            if data[i + 2] == 0x00 && i + 3 < data.len() && data[i + 3] == 0x01 {
                return Some((i, i + 4));
            }
        }
        i += 1;
    }
    None
}
