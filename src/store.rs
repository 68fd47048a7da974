//! Storage seams consumed by admission and scheduling.
//!
//! `db::SqliteStore` implements all of them; anything else that can answer
//! these queries can be plugged in instead.

use async_trait::async_trait;

use crate::db::models::{NewRequest, PendingRequest, PlayHistoryEntry, Station, Track};

#[async_trait]
pub trait CatalogLookup: Send + Sync {
  async fn find_track(&self, station_id: i64, track_id: &str) -> Result<Option<Track>, sqlx::Error>;

  fn is_requestable(&self, track: &Track) -> bool {
    track.is_requestable
  }
}

#[async_trait]
pub trait PlayHistoryStore: Send + Sync {
  /// Entries started at or after `since`, most recent first.
  async fn recent_entries(&self, station_id: i64, since: i64) -> Result<Vec<PlayHistoryEntry>, sqlx::Error>;

  async fn record(&self, station_id: i64, title: &str, artist: &str, started_at: i64) -> Result<i64, sqlx::Error>;
}

/// Conditions re-checked atomically with the insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendGuard {
  /// Reject if the same track has a request at or after this time, or one still unplayed.
  pub pending_since: i64,
  /// Reject if the same IP has a request at or after this time.
  pub ip_since: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
  Appended(i64),
  PendingConflict,
  RateLimited,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
  async fn append(&self, request: NewRequest, guard: AppendGuard) -> Result<AppendOutcome, sqlx::Error>;

  /// Timestamp of the newest request for the track that is either recent or unplayed.
  async fn most_recent_pending(&self, station_id: i64, track_id: &str, since: i64) -> Result<Option<i64>, sqlx::Error>;

  /// Requests from `ip` on any station at or after `since`.
  async fn count_by_ip_since(&self, ip: &str, since: i64) -> Result<i64, sqlx::Error>;

  /// Unplayed requests ordered by `skip_delay DESC, id ASC`.
  async fn pending_for_station(&self, station_id: i64) -> Result<Vec<PendingRequest>, sqlx::Error>;

  async fn find_pending(&self, station_id: i64, id: i64) -> Result<Option<PendingRequest>, sqlx::Error>;

  /// Sets `played_at` only if the request is still unplayed. Returns whether this call won.
  async fn mark_played(&self, id: i64, played_at: i64) -> Result<bool, sqlx::Error>;

  async fn clear_pending(&self, station_id: i64) -> Result<u64, sqlx::Error>;
}

#[async_trait]
pub trait StationDirectory: Send + Sync {
  async fn get(&self, station_id: i64) -> Result<Option<Station>, sqlx::Error>;

  async fn list(&self) -> Result<Vec<Station>, sqlx::Error>;
}
