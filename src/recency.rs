//! Duplicate and recency checks shared by admission and scheduling.

use std::sync::Arc;

use crate::{
  db::models::{Station, Track},
  store::{PlayHistoryStore, RequestStore},
  Error, Result,
};

/// Recent-play window used when a station has no threshold configured.
pub const DEFAULT_RECENT_PLAY_MINUTES: u32 = 15;

/// A track with an outstanding request inside this many seconds is a duplicate.
pub const PENDING_WINDOW_SECONDS: i64 = 600;

/// Title and artist of a track, as compared for duplicates.
#[derive(Debug, Clone, Copy)]
pub struct TrackIdentity<'a> {
  pub title: &'a str,
  pub artist: &'a str,
}

impl<'a> From<&'a Track> for TrackIdentity<'a> {
  fn from(track: &'a Track) -> Self {
    Self { title: &track.title, artist: &track.artist }
  }
}

fn normalize(value: &str) -> String {
  value
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

fn same_field(a: &str, b: &str) -> bool {
  let a = normalize(a);
  !a.is_empty() && a == normalize(b)
}

/// True when the candidate shares a title or an artist with any recent play.
pub fn is_duplicate_of_recent_play(candidate: &TrackIdentity<'_>, recent: &[TrackIdentity<'_>]) -> bool {
  recent.iter().any(|played| {
    same_field(candidate.title, played.title) || same_field(candidate.artist, played.artist)
  })
}

pub struct RecencyChecker {
  history: Arc<dyn PlayHistoryStore>,
  requests: Arc<dyn RequestStore>,
}

impl RecencyChecker {
  pub fn new(history: Arc<dyn PlayHistoryStore>, requests: Arc<dyn RequestStore>) -> Self {
    Self { history, requests }
  }

  pub async fn check_recent_play(&self, track: &Track, station: &Station, now: i64) -> Result<()> {
    let threshold = station
      .request_threshold_minutes
      .unwrap_or(DEFAULT_RECENT_PLAY_MINUTES);
    if threshold == 0 {
      return Ok(());
    }

    let since = now - i64::from(threshold) * 60;
    let entries = self.history.recent_entries(station.id, since).await?;
    let recent: Vec<TrackIdentity<'_>> = entries
      .iter()
      .map(|e| TrackIdentity { title: &e.title, artist: &e.artist })
      .collect();

    if is_duplicate_of_recent_play(&TrackIdentity::from(track), &recent) {
      tracing::debug!(
        "Track {} ({} - {}) played within the last {} minutes on station {}",
        track.id,
        track.artist,
        track.title,
        threshold,
        station.id
      );
      return Err(Error::DuplicateRecentPlay);
    }

    Ok(())
  }

  /// Fails closed: a lookup error counts as a duplicate so a broken store
  /// cannot be used to flood the queue.
  pub async fn check_pending_request(&self, track: &Track, station: &Station, now: i64) -> Result<()> {
    let since = now - PENDING_WINDOW_SECONDS;

    match self.requests.most_recent_pending(station.id, &track.id, since).await {
      Ok(Some(timestamp)) if timestamp > 0 => Err(Error::DuplicateOutstandingRequest),
      Ok(_) => Ok(()),
      Err(e) => {
        tracing::warn!(
          "Pending request lookup failed for track {} on station {}: {}",
          track.id,
          station.id,
          e
        );
        Err(Error::DuplicateOutstandingRequest)
      }
    }
  }
}
