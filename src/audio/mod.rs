//! # Audio Module
//!
//! Per-guild playback queue and session controller for Nanali Music.
//!
//! ## Architecture
//!
//! ### [`session`] - Session Controller
//! - One [`session::Session`] per guild, each with its own critical section
//! - Sequences resolve → start → completion → next track
//! - Race-free command surface (enqueue, skip, stop, reorder, settings)
//!
//! ### [`player`] - Session Registry
//! - Concurrent map of guild sessions
//! - Idle sweeps and shutdown
//!
//! ### [`queue`] - Queue Model
//! - Tracks, loop modes and the bounded pending queue
//! - Snapshots and pagination for the queue view
//!
//! ### [`effects`] - Playback Settings
//! - Volume/effect domains and the bass-boost ladder
//!
//! ### [`backend`] / [`voice`] - Collaborators
//! - Traits for the stream player and voice connection
//! - Songbird implementation of both
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let sessions = SessionManager::new(deps);
//! let session = sessions.session(guild_id);
//!
//! session.connect(voice_channel).await?;
//! let outcome = session.enqueue("never gonna give you up", user_id).await?;
//! println!("posición {}", outcome.position);
//!
//! session.skip().await?;
//! session.set_volume(80)?;
//! ```

pub mod backend;
pub mod effects;
pub mod idle;
pub mod player;
pub mod queue;
pub mod session;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
