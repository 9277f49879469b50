//! MPEG-1 transport stream playback core for trick-play capable players.
//!
//! - [`ts`] demultiplexes transport packets into video and audio payloads.
//! - [`mpeg1`] decodes I and P pictures into a pair of frame buffers.
//! - [`queue`], [`source`] and [`player`] move chunks between an I/O
//!   producer and a decode thread.
//! - [`index`] builds and reads seek indexes for fast-forward and rewind
//!   streams.

pub mod config;
pub mod error;
pub mod index;
pub mod mpeg1;
pub mod player;
pub mod queue;
pub mod source;
pub mod synth;
pub mod ts;

pub use config::{DecoderConfig, IndexConfig};
pub use error::{Error, Result};
pub use index::mapper::TimeMapper;
pub use index::{Direction, SeekIndex};
pub use mpeg1::{Mpeg1Decoder, PresentMode, VideoSink};
pub use player::{display_handoff, DisplayHandle, DisplayHandoff, Player};
pub use ts::AudioSink;
