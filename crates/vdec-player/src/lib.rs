//! # vdec-player
//!
//! 单路 H.264 解码会话: 把调用方送来的数据块规整为 Annex B, 由 SPS 协商解码器配置,
//! 并串行化地提交给外部解码后端.
//!
//! 后端通过 [`BackendFactory`] / [`DecoderBackend`] 接入, 输出经 [`OutputSink`] 回报.
//! 会话的状态变化、超时与故障以 [`PlayerEvent`] 广播.

pub mod backend;
pub mod config;
pub mod event;
pub mod frame;
pub mod negotiate;
pub mod player;
pub mod sink;

pub use backend::{BackendFactory, BackendState, ChunkType, DecoderBackend, EncodedChunk};
pub use config::{DecoderConfig, HardwareAcceleration, PlayerOptions};
pub use event::{EventEmitter, PlayerEvent};
pub use frame::{ColorSpace, DecodedFrame};
pub use negotiate::negotiate;
pub use player::VideoPlayer;
pub use sink::OutputSink;
