use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::broadcast;
use vdec_core::{BitWriter, VdecError};
use vdec_h264::exp_golomb::write_ue;
use vdec_h264::{BoxSize, NaluStreamInfo, START_CODE, escape_rbsp};

use super::VideoPlayer;
use crate::backend::ChunkType;
use crate::config::{DecoderConfig, HardwareAcceleration, PlayerOptions};
use crate::event::PlayerEvent;


use fake_backend::{FakeFactory, Harness, OutputMode};

const PPS: &[u8] = &[0x68, 0xCE, 0x38, 0x80];
const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x21, 0xA0];
const P_SLICE: &[u8] = &[0x41, 0x9A, 0x02, 0x04];

/// Baseline SPS (profile 0x42, constraint 0xC0, level 0x1E), 尺寸需为 16 的倍数
fn sps_nal(width: u32, height: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0x42, 8);
    bw.write_bits(0xC0, 8);
    bw.write_bits(0x1E, 8);
    write_ue(&mut bw, 0); // sps_id
    write_ue(&mut bw, 0); // log2_max_frame_num_minus4
    write_ue(&mut bw, 2); // pic_order_cnt_type
    write_ue(&mut bw, 1); // max_num_ref_frames
    bw.write_flag(false);
    write_ue(&mut bw, width / 16 - 1);
    write_ue(&mut bw, height / 16 - 1);
    bw.write_flag(true); // frame_mbs_only_flag
    bw.write_flag(true); // direct_8x8_inference_flag
    bw.write_flag(false); // frame_cropping_flag
    bw.write_flag(false); // vui_parameters_present_flag
    bw.write_bit(1);

    let mut nal = vec![0x67];
    nal.extend(escape_rbsp(&bw.finish()));
    nal
}

fn annex_b(units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(unit);
    }
    out
}

fn packet(box_size: usize, units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        let len = unit.len().to_be_bytes();
        out.extend_from_slice(&len[len.len() - box_size..]);
        out.extend_from_slice(unit);
    }
    out
}

fn keyframe_chunk() -> Vec<u8> {
    let sps = sps_nal(640, 480);
    annex_b(&[&sps, PPS, IDR])
}

fn setup(harness: Harness) -> (Arc<Harness>, VideoPlayer<FakeFactory>) {
    setup_with(harness, PlayerOptions::default())
}

fn setup_with(harness: Harness, options: PlayerOptions) -> (Arc<Harness>, VideoPlayer<FakeFactory>) {
    let harness = Arc::new(harness);
    let player = VideoPlayer::new(FakeFactory::new(Arc::clone(&harness)), options);
    (harness, player)
}

fn drain(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count_warn(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::Warn(_)))
        .count()
}

fn count_error(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::Error(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_decode_before_sps_returns_none() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));
    let mut rx = player.subscribe();

    assert!(player.decode(&annex_b(&[P_SLICE]), 0).await.is_none());

    assert!(!player.is_initialized());
    assert!(player.decoder_config().is_none());
    assert!(harness.submissions().is_empty());
    assert_eq!(Harness::count(&harness.probes), 0);
    let events = drain(&mut rx);
    assert_eq!(count_warn(&events), 0);
    assert_eq!(count_error(&events), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sps_only_packet_chunk_configures_decoder() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));
    let mut rx = player.subscribe();
    let sps = sps_nal(640, 480);

    let chunk = packet(4, &[&sps, PPS]);
    let started = tokio::time::Instant::now();
    assert!(player.decode(&chunk, 1_000).await.is_none());
    // 不等待输出, 也不报超时
    assert_eq!(started.elapsed(), Duration::ZERO);
    let events = drain(&mut rx);
    assert_eq!(count_warn(&events), 0);
    assert_eq!(count_error(&events), 0);
    assert!(!player.sink.has_waiter());

    assert_eq!(
        player.decoder_config(),
        Some(DecoderConfig {
            codec: "avc1.42C01E".into(),
            coded_width: 640,
            coded_height: 480,
            optimize_for_latency: true,
            hardware_acceleration: HardwareAcceleration::PreferHardware,
        })
    );
    assert!(player.is_initialized());
    assert_eq!(
        player.stream_info(),
        NaluStreamInfo::Packet {
            box_size: BoxSize::Four
        }
    );

    // 参数集仍会提交给后端, 只是不产生输出
    let submissions = harness.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].chunk_type, ChunkType::Delta);
    assert_eq!(&submissions[0].data[..], &annex_b(&[&sps, PPS])[..]);
    assert_eq!(player.last_submitted_timestamp(), 1_000);

    // 随后的关键帧直接解码
    let frame = player
        .decode(&packet(4, &[IDR]), 2_000)
        .await
        .expect("关键帧应输出");
    assert_eq!(frame.timestamp_micros, 2_000);
}

#[tokio::test(start_paused = true)]
async fn test_keyframe_then_delta() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));
    let mut rx = player.subscribe();

    let frame = player.decode(&keyframe_chunk(), 0).await.expect("关键帧应输出");
    assert_eq!(frame.timestamp_micros, 0);
    let frame = player
        .decode(&annex_b(&[P_SLICE]), 33_333)
        .await
        .expect("P 帧应输出");
    assert_eq!(frame.timestamp_micros, 33_333);

    let types: Vec<ChunkType> = harness
        .submissions()
        .iter()
        .map(|c| c.chunk_type)
        .collect();
    assert_eq!(types, vec![ChunkType::Key, ChunkType::Delta]);
    assert_eq!(player.stream_info(), NaluStreamInfo::AnnexB);
    assert_eq!(player.last_submitted_timestamp(), 33_333);
    assert_eq!(
        player.last_frame().map(|f| f.timestamp_micros),
        Some(33_333)
    );

    let frames = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, PlayerEvent::Frame(_)))
        .count();
    assert_eq!(frames, 2);
}

#[tokio::test(start_paused = true)]
async fn test_packet_chunk_is_submitted_as_annex_b() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));
    let sps = sps_nal(640, 480);

    let chunk = packet(2, &[&sps, PPS, IDR]);
    assert!(player.decode(&chunk, 0).await.is_some());

    assert_eq!(
        player.stream_info(),
        NaluStreamInfo::Packet {
            box_size: BoxSize::Two
        }
    );
    let submissions = harness.submissions();
    assert_eq!(submissions[0].chunk_type, ChunkType::Key);
    assert_eq!(&submissions[0].data[..], &annex_b(&[&sps, PPS, IDR])[..]);
}

#[tokio::test(start_paused = true)]
async fn test_hardware_unsupported_falls_back() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate).with_support(false, true));

    assert!(player.decode(&keyframe_chunk(), 0).await.is_some());

    let config = player.decoder_config().expect("应已配置");
    assert_eq!(
        config.hardware_acceleration,
        HardwareAcceleration::NoPreference
    );
    assert!(config.optimize_for_latency);
    assert_eq!(Harness::count(&harness.probes), 2);
}

#[tokio::test(start_paused = true)]
async fn test_negotiation_exhausted_then_recovers() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate).with_support(false, false));
    let mut rx = player.subscribe();

    assert!(player.decode(&keyframe_chunk(), 0).await.is_none());
    let events = drain(&mut rx);
    assert_eq!(count_error(&events), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::Error(VdecError::UnsupportedConfiguration(_))
    )));
    assert!(harness.submissions().is_empty());
    assert!(!player.is_initialized());

    harness.software.store(true, Ordering::SeqCst);
    assert!(player.decode(&keyframe_chunk(), 33_333).await.is_some());
    assert_eq!(Harness::count(&harness.probes), 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_decodes_never_overlap() {
    let options = PlayerOptions {
        decode_timeout_ms: 1_000,
        ..PlayerOptions::default()
    };
    let (harness, player) = setup_with(Harness::new(OutputMode::Deferred), options);
    let player = Arc::new(player);

    assert!(player.decode(&keyframe_chunk(), 0).await.is_some());

    let mut handles = Vec::new();
    for i in 1..=8u64 {
        let player = Arc::clone(&player);
        handles.push(tokio::spawn(async move {
            player.decode(&annex_b(&[P_SLICE]), i * 1_000).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_some());
    }

    let mut timestamps: Vec<u64> = harness
        .submissions()
        .iter()
        .map(|c| c.timestamp_micros)
        .collect();
    assert_eq!(timestamps.len(), 9);
    timestamps.sort_unstable();
    assert_eq!(timestamps, (0..=8u64).map(|i| i * 1_000).collect::<Vec<_>>());
    assert!(!harness.overlapped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_lock_timeout_warns_once_and_recovers() {
    let harness = Harness::new(OutputMode::Immediate).with_probe_delay(Duration::from_millis(50));
    let (harness, player) = setup(harness);
    let player = Arc::new(player);
    let mut rx = player.subscribe();

    // 第一个调用在协商中持有解码锁 50 ms
    let first = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.decode(&keyframe_chunk(), 0).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(player.decode(&annex_b(&[IDR]), 1_000).await.is_none());
    let events = drain(&mut rx);
    assert_eq!(count_warn(&events), 1);

    assert!(first.await.unwrap().is_some());
    // 解码锁未被遗留
    assert!(player.decode(&annex_b(&[P_SLICE]), 2_000).await.is_some());
    assert_eq!(count_warn(&drain(&mut rx)), 0);
    assert_eq!(harness.submissions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_output_timeout_warns() {
    let (harness, player) = setup(Harness::new(OutputMode::Silent));
    let mut rx = player.subscribe();

    assert!(player.decode(&keyframe_chunk(), 0).await.is_none());

    let events = drain(&mut rx);
    assert_eq!(count_warn(&events), 1);
    assert_eq!(count_error(&events), 0);
    assert_eq!(harness.submissions().len(), 1);
    assert!(!player.sink.has_waiter());
}

#[tokio::test(start_paused = true)]
async fn test_late_output_not_returned_to_next_call() {
    // 输出延迟 20 ms, 超过 15 ms 的等待上限
    let harness = Harness::new(OutputMode::Deferred).with_output_delay(Duration::from_millis(20));
    let (_harness, player) = setup(harness);
    let mut rx = player.subscribe();

    assert!(player.decode(&keyframe_chunk(), 0).await.is_none());
    assert_eq!(count_warn(&drain(&mut rx)), 1);

    // 上一帧在本次等待期间到达, 不能作为本次结果返回
    let frame = player.decode(&annex_b(&[P_SLICE]), 1_000).await;
    assert_eq!(frame.map(|f| f.timestamp_micros), None);
    assert_eq!(player.last_frame().map(|f| f.timestamp_micros), Some(0));

    let events = drain(&mut rx);
    let frame_timestamps: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            PlayerEvent::Frame(frame) => Some(frame.timestamp_micros),
            _ => None,
        })
        .collect();
    assert_eq!(frame_timestamps, vec![0]);
    assert_eq!(count_warn(&events), 1);
}

#[tokio::test(start_paused = true)]
async fn test_output_after_seek_goes_to_new_call() {
    let options = PlayerOptions {
        decode_timeout_ms: 1_000,
        ..PlayerOptions::default()
    };
    let harness = Harness::new(OutputMode::Deferred).with_output_delay(Duration::from_millis(20));
    let (_harness, player) = setup_with(harness, options);
    let player = Arc::new(player);

    let before_seek = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.decode(&keyframe_chunk(), 0).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    player.reset_for_seek();
    assert!(before_seek.await.unwrap().is_none());

    // 跳转前数据块的帧先于本次输出到达
    let frame = player
        .decode(&annex_b(&[IDR]), 5_000_000)
        .await
        .expect("跳转后关键帧应输出");
    assert_eq!(frame.timestamp_micros, 5_000_000);
    assert_eq!(
        player.last_frame().map(|f| f.timestamp_micros),
        Some(5_000_000)
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_in_flight_and_queued_decodes() {
    let options = PlayerOptions {
        decode_timeout_ms: 1_000,
        ..PlayerOptions::default()
    };
    let (harness, player) = setup_with(Harness::new(OutputMode::Silent), options);
    let player = Arc::new(player);
    let mut rx = player.subscribe();

    let in_flight = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.decode(&keyframe_chunk(), 0).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    let queued = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.decode(&annex_b(&[P_SLICE]), 1_000).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    player.reset_for_seek();

    assert!(in_flight.await.unwrap().is_none());
    assert!(queued.await.unwrap().is_none());
    assert_eq!(Harness::count(&harness.resets), 1);
    assert_eq!(harness.submissions().len(), 1);

    let events = drain(&mut rx);
    assert_eq!(count_warn(&events), 0);
    assert_eq!(count_error(&events), 0);

    // 配置与封装信息保留
    assert!(player.decoder_config().is_some());
    assert_eq!(player.stream_info(), NaluStreamInfo::AnnexB);
}

#[tokio::test(start_paused = true)]
async fn test_reset_then_keyframe_without_renegotiation() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));

    assert!(player.decode(&keyframe_chunk(), 0).await.is_some());
    assert_eq!(Harness::count(&harness.probes), 1);
    assert_eq!(harness.configure_count(), 1);

    player.reset_for_seek();
    assert!(!player.is_initialized());

    let frame = player
        .decode(&annex_b(&[IDR]), 5_000_000)
        .await
        .expect("复位后关键帧应输出");
    assert_eq!(frame.timestamp_micros, 5_000_000);
    assert_eq!(Harness::count(&harness.probes), 1);
    assert_eq!(harness.configure_count(), 2);
    assert_eq!(
        harness.submissions().last().map(|c| c.chunk_type),
        Some(ChunkType::Key)
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_before_any_decode_is_noop() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));
    player.reset_for_seek();
    assert_eq!(Harness::count(&harness.resets), 0);
    assert!(player.decode(&keyframe_chunk(), 0).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent_and_recreates_backend() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));
    let mut rx = player.subscribe();

    assert!(player.decode(&keyframe_chunk(), 0).await.is_some());
    player.close();
    player.close();

    assert_eq!(Harness::count(&harness.closes), 1);
    assert!(!player.is_initialized());
    assert!(player.decoder_config().is_none());
    assert_eq!(player.stream_info(), NaluStreamInfo::Unknown);

    // 重建后端, 但没有 SPS 无法配置
    assert!(player.decode(&annex_b(&[P_SLICE]), 1_000).await.is_none());
    assert_eq!(Harness::count(&harness.created), 2);
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, PlayerEvent::Debug(msg) if msg.contains("创建新的后端实例")))
    );

    assert!(player.decode(&keyframe_chunk(), 2_000).await.is_some());
    assert_eq!(Harness::count(&harness.probes), 2);
    assert_eq!(Harness::count(&harness.created), 2);
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_emits_single_error() {
    let (harness, player) = setup(Harness::new(OutputMode::FailSubmit));
    let mut rx = player.subscribe();

    assert!(player.decode(&keyframe_chunk(), 42).await.is_none());

    let events = drain(&mut rx);
    assert_eq!(count_error(&events), 1);
    assert_eq!(count_warn(&events), 0);
    match events.iter().find(|e| matches!(e, PlayerEvent::Error(_))) {
        Some(PlayerEvent::Error(VdecError::BackendFault(msg))) => {
            assert!(msg.contains("时间戳 42"), "msg={}", msg)
        }
        other => panic!("期望 BackendFault, 实际: {:?}", other),
    }
    assert!(harness.submissions().is_empty());
    assert!(!player.sink.has_waiter());
}

#[tokio::test(start_paused = true)]
async fn test_async_backend_error_emits_single_error() {
    let (_harness, player) = setup(Harness::new(OutputMode::AsyncError));
    let mut rx = player.subscribe();

    assert!(player.decode(&keyframe_chunk(), 0).await.is_none());

    let events = drain(&mut rx);
    assert_eq!(count_error(&events), 1);
    assert_eq!(count_warn(&events), 0);
}

#[tokio::test(start_paused = true)]
async fn test_broken_packet_framing_reports_error() {
    let (harness, player) = setup(Harness::new(OutputMode::Immediate));
    let mut rx = player.subscribe();
    let sps = sps_nal(640, 480);

    assert!(player.decode(&packet(4, &[&sps, PPS, IDR]), 0).await.is_some());

    // 长度字段声明 32 字节, 实际只有 2 字节
    let broken = [0x00, 0x00, 0x00, 0x20, 0x41, 0x9A];
    assert!(player.decode(&broken, 1_000).await.is_none());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::Error(VdecError::MalformedBitstream(_))
    )));
    assert_eq!(harness.submissions().len(), 1);
}

#[test]
fn test_is_supported_requires_context_and_capability() {
    let harness = Arc::new(Harness::new(OutputMode::Immediate));
    let mut factory = FakeFactory::new(Arc::clone(&harness));
    assert!(VideoPlayer::is_supported(&factory));

    factory.permitted = false;
    assert!(!VideoPlayer::is_supported(&factory));

    factory.permitted = true;
    factory.present = false;
    assert!(!VideoPlayer::is_supported(&factory));
}
