//! # Audio Module
//!
//! Per-channel playback engine for Open Music.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - One [`session::Session`] per guild, created on first use
//! - Idle sessions with an empty queue are reclaimed by a background sweep
//!
//! ### [`session`] - Playback Session
//! - Owns the queue and the stream controller behind one fair async lock
//! - Commands for the same guild apply one at a time, in arrival order
//!
//! ### [`controller`] - Stream Controller
//! - `Idle -> Loading -> Playing <-> Paused`, with `Stopping` on the way out
//! - Failed tracks are skipped; too many in a row abandon playback
//!
//! ### [`queue`] - Queue Management
//! - FIFO with repeat (off / one / all) and shuffle of pending tracks
//!
//! ### [`transport`] - Voice Transport
//! - Trait the controller drives; [`songbird_transport`] is the real one
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_sessions::audio::registry::SessionRegistry;
//! use serenity::all::GuildId;
//!
//! # async fn example(registry: SessionRegistry, track: open_music_sessions::audio::track::Track) -> anyhow::Result<()> {
//! let session = registry.get_or_create(GuildId::new(123456789));
//! session.enqueue(track).await?;
//! session.pause().await?;
//! session.resume().await?;
//! session.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod equalizer;
pub mod queue;
pub mod registry;
pub mod session;
pub mod songbird_transport;
pub mod track;
pub mod transport;

pub use controller::{PlaybackNotice, PlaybackState};
pub use queue::{QueueInfo, RepeatMode};
pub use registry::SessionRegistry;
pub use session::{CloseReason, CommandOutcome, Session, SessionEvent};
pub use track::{StreamLocator, Track};
