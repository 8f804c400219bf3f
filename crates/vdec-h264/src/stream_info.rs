//! NAL 单元封装格式识别.
//!
//! H.264 基本流有两种常见的 NAL 分界方式:
//! - Annex B: 以 `00 00 01` / `00 00 00 01` 起始码分隔
//! - 长度前缀 (AVCC 风格 "packet"): 每个 NAL 前有 1/2/4 字节大端长度
//!
//! [`identify`] 是纯函数, 结果由调用方缓存. 对无法判定的数据返回
//! [`NaluStreamInfo::Unknown`], 调用方应在后续数据块上继续探测.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

/// 识别所需的最小数据长度 (起始码 + NAL 头部)
const MIN_PROBE_LEN: usize = 4;

/// 长度前缀探测顺序: 4 字节最常见, 优先尝试
const PROBE_BOX_SIZES: [BoxSize; 3] = [BoxSize::Four, BoxSize::Two, BoxSize::One];

/// 长度前缀字节数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxSize {
    /// 1 字节长度前缀
    One,
    /// 2 字节长度前缀
    Two,
    /// 4 字节长度前缀
    Four,
}

impl BoxSize {
    /// 从字节数创建, 仅接受 1/2/4
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            4 => Some(Self::Four),
            _ => None,
        }
    }

    /// 长度前缀字节数
    pub fn len(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

/// 码流封装信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaluStreamInfo {
    /// 起始码分隔
    AnnexB,
    /// 长度前缀分隔
    Packet {
        /// 长度前缀字节数
        box_size: BoxSize,
    },
    /// 无法判定
    Unknown,
}

impl NaluStreamInfo {
    /// 是否已得出确定结论
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// 长度前缀字节数 (仅 packet 格式有意义)
    pub fn box_size(&self) -> Option<usize> {
        match self {
            Self::Packet { box_size } => Some(box_size.len()),
            _ => None,
        }
    }
}

impl fmt::Display for NaluStreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnnexB => write!(f, "annexb"),
            Self::Packet { box_size } => write!(f, "packet(box_size={})", box_size.len()),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// 识别数据块的 NAL 封装格式
///
/// 先尝试长度前缀: 按 4/2/1 字节依次遍历, 仅当长度字段恰好覆盖整个数据块、
/// 每个长度非零且每个 NAL 头部合法时才判定为 packet. 长度为 256-511 的
/// 4 字节前缀以 `00 00 01` 开头, 因此起始码检查必须放在其后.
///
/// 以 3 字节起始码开头、同时又能解读为 4 字节长度前缀首单元的数据 (例如末尾带填充
/// 的 packet) 无法区分, 返回 `Unknown` 交给后续数据块判定.
pub fn identify(data: &[u8]) -> NaluStreamInfo {
    if data.len() < MIN_PROBE_LEN {
        return NaluStreamInfo::Unknown;
    }

    for box_size in PROBE_BOX_SIZES {
        if walks_length_prefixed(data, box_size.len()) {
            return NaluStreamInfo::Packet { box_size };
        }
    }

    if data.starts_with(&[0x00, 0x00, 0x00, 0x01]) {
        return NaluStreamInfo::AnnexB;
    }
    if data.starts_with(&[0x00, 0x00, 0x01]) && !looks_like_packet_head(data) {
        return NaluStreamInfo::AnnexB;
    }

    NaluStreamInfo::Unknown
}

/// 前 4 字节作为长度前缀时, 首个 NAL 单元能否完整落在数据块内且头部合法
fn looks_like_packet_head(data: &[u8]) -> bool {
    let nal_len = BigEndian::read_u32(&data[..4]) as usize;
    nal_len > 0 && nal_len <= data.len() - 4 && is_valid_nal_header(data[4])
}

/// 按给定长度前缀遍历, 判断数据是否为合法的 packet 格式
fn walks_length_prefixed(data: &[u8], box_size: usize) -> bool {
    let mut pos = 0usize;
    let mut units = 0usize;

    while pos < data.len() {
        if pos + box_size > data.len() {
            return false;
        }
        let nal_len = data[pos..pos + box_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        pos += box_size;

        if nal_len == 0 || nal_len > data.len() - pos {
            return false;
        }
        if !is_valid_nal_header(data[pos]) {
            return false;
        }
        pos += nal_len;
        units += 1;
    }

    units > 0
}

/// forbidden_zero_bit 为 0 且类型非 0
fn is_valid_nal_header(header: u8) -> bool {
    header & 0x80 == 0 && header & 0x1F != 0
}
