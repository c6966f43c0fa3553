//! Now-playing metadata resolution for internet audio streams.
//!
//! Stations publish the current track in incompatible ways: inline ICY
//! blocks interleaved with the audio, a metadata-capable sibling mount next
//! to a lossless one, or an Icecast `status-json.xsl` endpoint. A
//! [`MetaWatcher`] session works through those strategies in that order and
//! reports what it finds as [`MetaEvent`]s:
//!
//! ```no_run
//! # use nowplay_meta::{MetaEvent, MetaWatcher, StrategyHint};
//! # async fn demo() {
//! let watcher = MetaWatcher::new();
//! let mut session = watcher.watch("http://radio.example.com/rock-flac", StrategyHint::default());
//! while let Some(event) = session.recv().await {
//!     match event {
//!         MetaEvent::Update(info) => println!("{} - {}", info.station, info.title),
//!         MetaEvent::Resolved(_hint) => {} // persist and pass back next time
//!     }
//! }
//! # }
//! ```
//!
//! Raw titles flap around song boundaries; feed them through a
//! [`TitleStabilizer`] when only settled values should reach the UI.

mod config;
mod direct;
mod error;
pub mod icy;
mod sibling;
mod stabilize;
mod status;
mod types;
mod watch;

pub use config::{WatchConfig, DEFAULT_USER_AGENT};
pub use error::{Result, WatchError};
pub use sibling::SiblingCache;
pub use stabilize::TitleStabilizer;
pub use types::{Info, MetaEvent, StrategyHint, StrategyKind};
pub use watch::{MetaWatcher, WatchSession};
