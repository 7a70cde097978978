//! # Open Music Sessions
//!
//! Per-guild playback sessions for a Discord music bot: queue, stream state
//! machine, idle reclamation and the command dispatcher that drives them.
//!
//! The Discord layer ([`bot`]) and the songbird transport are thin adapters;
//! everything in [`audio`] and [`dispatcher`] runs against the
//! [`audio::transport::Transport`] trait.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod sources;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;
