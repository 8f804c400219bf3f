//! vdec-probe - H.264 码流探测工具
//!
//! 读取一个数据块文件, 输出封装格式、NAL 单元清单、关键帧判定与由 SPS 推导的解码器配置.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vdec::config::AppConfig;
use vdec_h264::{
    NalUnit, NaluStreamInfo, find_sps, identify, is_keyframe, length_prefixed_units, nal_units,
    parse_sps_unit, to_annex_b,
};
use vdec_player::{DecoderConfig, HardwareAcceleration};

/// vdec H.264 码流探测工具
#[derive(Parser, Debug)]
#[command(name = "vdec-probe", version, about = "H.264 码流探测工具")]
struct Cli {
    /// 输入文件路径
    input: PathBuf,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 配置文件 (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================
// 输出结构体
// ============================================================

#[derive(Serialize, Debug)]
struct ProbeOutput {
    size: usize,
    framing: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    box_size: Option<usize>,
    /// NAL 类型 → 数量
    nal_units: BTreeMap<String, usize>,
    keyframe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sps: Option<SpsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decoder_config: Option<DecoderConfig>,
}

#[derive(Serialize, Debug)]
struct SpsInfo {
    profile_idc: u8,
    level_idc: u8,
    chroma_format_idc: u32,
    bit_depth: u32,
    width: u32,
    height: u32,
    codec: String,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    } else if cli.config.is_none() {
        config.logging.level = "warn".to_string();
    }
    vdec::logging::init(&config.logging)?;

    let data = read_input(&cli.input)?;
    tracing::debug!("读取 {} 字节, path={}", data.len(), cli.input.display());

    let output = probe(&data, config.player.prefer_hardware)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&cli.input, &output);
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("无法打开文件, path={}", path.display()))
}

/// 分析一个数据块
fn probe(data: &[u8], prefer_hardware: bool) -> Result<ProbeOutput> {
    let info = identify(data);
    let units = list_units(data, &info)?;

    let mut counts = BTreeMap::new();
    for unit in &units {
        *counts.entry(unit.nal_type.to_string()).or_insert(0) += 1;
    }

    let annex_b = to_annex_b(data, &info)?;
    let sps = match find_sps(&annex_b) {
        Some(unit) => Some(parse_sps_unit(&unit).context("SPS 解析失败")?),
        None => None,
    };

    // 候选配置, 与会话协商时首先尝试的形式一致
    let decoder_config = sps.as_ref().map(|sps| {
        let hardware_acceleration = if prefer_hardware {
            HardwareAcceleration::PreferHardware
        } else {
            HardwareAcceleration::NoPreference
        };
        DecoderConfig {
            optimize_for_latency: true,
            ..DecoderConfig::from_sps(sps).with_hardware_acceleration(hardware_acceleration)
        }
    });

    Ok(ProbeOutput {
        size: data.len(),
        framing: info.to_string(),
        box_size: info.box_size(),
        nal_units: counts,
        keyframe: is_keyframe(&annex_b),
        sps: sps.map(|sps| SpsInfo {
            profile_idc: sps.profile_idc,
            level_idc: sps.level_idc,
            chroma_format_idc: sps.chroma_format_idc,
            bit_depth: sps.bit_depth_luma,
            width: sps.width,
            height: sps.height,
            codec: sps.codec_string(),
        }),
        decoder_config,
    })
}

/// 按封装格式枚举 NAL 单元; 未识别的数据按 Annex B 扫描
fn list_units<'a>(data: &'a [u8], info: &NaluStreamInfo) -> Result<Vec<NalUnit<'a>>> {
    match info.box_size() {
        Some(box_size) => length_prefixed_units(data, box_size)
            .collect::<Result<Vec<_>, _>>()
            .context("长度前缀数据损坏"),
        None => Ok(nal_units(data).collect()),
    }
}

fn print_text(path: &Path, output: &ProbeOutput) {
    println!("[CHUNK]");
    println!("  文件名       : {}", path.display());
    println!("  大小         : {} 字节", output.size);
    println!("  封装格式     : {}", output.framing);
    println!("  关键帧       : {}", if output.keyframe { "是" } else { "否" });
    println!("[/CHUNK]");
    println!();

    println!("[NAL]");
    if output.nal_units.is_empty() {
        println!("  (无)");
    }
    for (nal_type, count) in &output.nal_units {
        println!("  {:<12} : {}", nal_type, count);
    }
    println!("[/NAL]");
    println!();

    if let Some(sps) = &output.sps {
        println!("[SPS]");
        println!("  profile_idc  : {}", sps.profile_idc);
        println!("  level_idc    : {}", sps.level_idc);
        println!("  色度格式     : {}", sps.chroma_format_idc);
        println!("  位深         : {}", sps.bit_depth);
        println!("  分辨率       : {}x{}", sps.width, sps.height);
        println!("  编解码器     : {}", sps.codec);
        println!("[/SPS]");
        println!();
    }

    if let Some(config) = &output.decoder_config {
        println!("[DECODER]");
        println!("  {}", config);
        println!("[/DECODER]");
    }
}
