//! Playback clock reconciliation.
//!
//! Clients never report their position to the server. Instead the room
//! keeps the last authoritative triple `(current_time, is_playing,
//! last_updated_at)` set by the host, and whenever someone needs "where is
//! the player now?" the answer is derived from elapsed wall-clock time:
//!
//! ```text
//! corrected = current_time + (is_playing ? now - last_updated_at : 0)
//! ```
//!
//! [`corrected_time`] is the only place that formula lives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use watchparty_protocol::{PlaybackSync, ServerEvent};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time, in Unix milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> u64;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // A clock set before 1970 reads as the epoch rather than failing.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Used for deterministic tests and
/// simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// The authoritative playback snapshot of a room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    /// Position in seconds at `last_updated_at`.
    pub current_time: f64,
    pub is_playing: bool,
    /// Unix milliseconds. Never moves backwards.
    pub last_updated_at: u64,
}

impl Playback {
    /// A paused player at the start of the video.
    pub fn new(now_millis: u64) -> Self {
        Self {
            current_time: 0.0,
            is_playing: false,
            last_updated_at: now_millis,
        }
    }

    /// Records a host action.
    pub fn apply(&mut self, action: PlaybackAction, now_millis: u64) {
        self.current_time = action.position();
        self.is_playing = matches!(action, PlaybackAction::Play(_));
        self.last_updated_at = self.last_updated_at.max(now_millis);
    }

    /// Rewinds to a paused start, e.g. when the video changes.
    pub fn reset(&mut self, now_millis: u64) {
        self.apply(PlaybackAction::Pause(0.0), now_millis);
    }

    /// The drift-corrected position ready to send to a client.
    pub fn sync(&self, now_millis: u64) -> PlaybackSync {
        PlaybackSync {
            current_time: corrected_time(self, now_millis),
            is_playing: self.is_playing,
        }
    }
}

/// Computes the current play position from the last recorded snapshot.
///
/// A `now` earlier than the snapshot (clock skew) counts as zero elapsed.
pub fn corrected_time(playback: &Playback, now_millis: u64) -> f64 {
    if !playback.is_playing {
        return playback.current_time;
    }
    let elapsed = now_millis.saturating_sub(playback.last_updated_at);
    playback.current_time + elapsed as f64 / 1000.0
}

// ---------------------------------------------------------------------------
// PlaybackAction
// ---------------------------------------------------------------------------

/// A host's playback command.
///
/// A seek leaves the player paused; a client seeking while playing
/// follows up with `Play` itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackAction {
    Play(f64),
    Pause(f64),
    Seek(f64),
}

impl PlaybackAction {
    /// The position, in seconds, the action refers to.
    pub fn position(&self) -> f64 {
        match *self {
            Self::Play(t) | Self::Pause(t) | Self::Seek(t) => t,
        }
    }

    /// The event relayed to the other viewers.
    pub fn to_event(&self) -> ServerEvent {
        match *self {
            Self::Play(current_time) => ServerEvent::ReceivePlay { current_time },
            Self::Pause(current_time) => ServerEvent::ReceivePause { current_time },
            Self::Seek(current_time) => ServerEvent::ReceiveSeek { current_time },
        }
    }
}
