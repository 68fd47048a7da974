use async_trait::async_trait;

use super::{
  models::{NewRequest, PendingRequest, PlayHistoryEntry, Station, Track},
  DbPool,
};
use crate::store::{
  AppendGuard, AppendOutcome, CatalogLookup, PlayHistoryStore, RequestStore, StationDirectory,
};

/// SQLite backed implementation of every storage seam.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: DbPool,
}

impl SqliteStore {
  pub fn new(pool: DbPool) -> Self {
    Self { pool }
  }

  pub async fn create_station(
    &self,
    name: &str,
    enable_requests: bool,
    request_threshold_minutes: Option<u32>,
    request_delay_minutes: Option<u32>,
    utc_offset_minutes: i32,
  ) -> Result<Station, sqlx::Error> {
    let result = sqlx::query(
      r#"
      INSERT INTO stations (name, enable_requests, request_threshold_minutes, request_delay_minutes, utc_offset_minutes)
      VALUES (?, ?, ?, ?, ?)
      "#,
    )
    .bind(name)
    .bind(enable_requests)
    .bind(request_threshold_minutes)
    .bind(request_delay_minutes)
    .bind(utc_offset_minutes)
    .execute(&self.pool)
    .await?;

    let id = result.last_insert_rowid();
    tracing::info!("Created station {} (id: {})", name, id);

    Ok(Station {
      id,
      name: name.to_string(),
      enable_requests,
      request_threshold_minutes,
      request_delay_minutes,
      utc_offset_minutes,
    })
  }

  /// Inserts or replaces a catalog entry for a station.
  pub async fn upsert_track(&self, track: &Track) -> Result<(), sqlx::Error> {
    sqlx::query(
      r#"
      INSERT INTO tracks (id, station_id, title, artist, is_requestable)
      VALUES (?, ?, ?, ?, ?)
      ON CONFLICT (station_id, id) DO UPDATE SET
        title = excluded.title,
        artist = excluded.artist,
        is_requestable = excluded.is_requestable
      "#,
    )
    .bind(&track.id)
    .bind(track.station_id)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(track.is_requestable)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}

#[async_trait]
impl CatalogLookup for SqliteStore {
  async fn find_track(&self, station_id: i64, track_id: &str) -> Result<Option<Track>, sqlx::Error> {
    sqlx::query_as::<_, Track>(
      r#"
      SELECT id, station_id, title, artist, is_requestable
      FROM tracks
      WHERE station_id = ? AND id = ?
      "#,
    )
    .bind(station_id)
    .bind(track_id)
    .fetch_optional(&self.pool)
    .await
  }
}

#[async_trait]
impl PlayHistoryStore for SqliteStore {
  async fn recent_entries(&self, station_id: i64, since: i64) -> Result<Vec<PlayHistoryEntry>, sqlx::Error> {
    sqlx::query_as::<_, PlayHistoryEntry>(
      r#"
      SELECT id, station_id, title, artist, timestamp_start
      FROM play_history
      WHERE station_id = ? AND timestamp_start >= ?
      ORDER BY timestamp_start DESC
      "#,
    )
    .bind(station_id)
    .bind(since)
    .fetch_all(&self.pool)
    .await
  }

  async fn record(&self, station_id: i64, title: &str, artist: &str, started_at: i64) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
      r#"
      INSERT INTO play_history (station_id, title, artist, timestamp_start)
      VALUES (?, ?, ?, ?)
      "#,
    )
    .bind(station_id)
    .bind(title)
    .bind(artist)
    .bind(started_at)
    .execute(&self.pool)
    .await?;

    Ok(result.last_insert_rowid())
  }
}

/// Why a guarded insert wrote nothing. A failed lookup counts as a pending
/// conflict, the same way the pending-request check fails closed.
fn blocked_append_outcome(lookup: Result<Option<i64>, sqlx::Error>) -> AppendOutcome {
  match lookup {
    Ok(Some(_)) => AppendOutcome::PendingConflict,
    Ok(None) => AppendOutcome::RateLimited,
    Err(e) => {
      tracing::warn!("Could not classify blocked request insert: {}", e);
      AppendOutcome::PendingConflict
    }
  }
}

#[async_trait]
impl RequestStore for SqliteStore {
  async fn append(&self, request: NewRequest, guard: AppendGuard) -> Result<AppendOutcome, sqlx::Error> {
    // Single statement so the duplicate and rate-limit conditions are
    // evaluated against the same snapshot the row is inserted into.
    let result = sqlx::query(
      r#"
      INSERT INTO requests (station_id, track_id, ip, timestamp, played_at, skip_delay)
      SELECT ?, ?, ?, ?, 0, ?
      WHERE NOT EXISTS (
        SELECT 1 FROM requests
        WHERE station_id = ? AND track_id = ? AND (timestamp >= ? OR played_at = 0)
      )
      AND (
        ? IS NULL OR NOT EXISTS (
          SELECT 1 FROM requests WHERE ip = ? AND timestamp >= ?
        )
      )
      "#,
    )
    .bind(request.station_id)
    .bind(&request.track_id)
    .bind(&request.ip)
    .bind(request.timestamp)
    .bind(request.skip_delay)
    .bind(request.station_id)
    .bind(&request.track_id)
    .bind(guard.pending_since)
    .bind(guard.ip_since)
    .bind(&request.ip)
    .bind(guard.ip_since)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 1 {
      return Ok(AppendOutcome::Appended(result.last_insert_rowid()));
    }

    // Nothing inserted: work out which condition blocked it.
    let lookup = self
      .most_recent_pending(request.station_id, &request.track_id, guard.pending_since)
      .await;
    Ok(blocked_append_outcome(lookup))
  }

  async fn most_recent_pending(&self, station_id: i64, track_id: &str, since: i64) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
      r#"
      SELECT timestamp
      FROM requests
      WHERE station_id = ? AND track_id = ? AND (timestamp >= ? OR played_at = 0)
      ORDER BY timestamp DESC
      LIMIT 1
      "#,
    )
    .bind(station_id)
    .bind(track_id)
    .bind(since)
    .fetch_optional(&self.pool)
    .await
  }

  async fn count_by_ip_since(&self, ip: &str, since: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
      r#"
      SELECT COUNT(*)
      FROM requests
      WHERE ip = ? AND timestamp >= ?
      "#,
    )
    .bind(ip)
    .bind(since)
    .fetch_one(&self.pool)
    .await
  }

  async fn pending_for_station(&self, station_id: i64) -> Result<Vec<PendingRequest>, sqlx::Error> {
    sqlx::query_as::<_, PendingRequest>(
      r#"
      SELECT id, station_id, track_id, ip, timestamp, played_at, skip_delay
      FROM requests
      WHERE station_id = ? AND played_at = 0
      ORDER BY skip_delay DESC, id ASC
      "#,
    )
    .bind(station_id)
    .fetch_all(&self.pool)
    .await
  }

  async fn find_pending(&self, station_id: i64, id: i64) -> Result<Option<PendingRequest>, sqlx::Error> {
    sqlx::query_as::<_, PendingRequest>(
      r#"
      SELECT id, station_id, track_id, ip, timestamp, played_at, skip_delay
      FROM requests
      WHERE station_id = ? AND id = ? AND played_at = 0
      "#,
    )
    .bind(station_id)
    .bind(id)
    .fetch_optional(&self.pool)
    .await
  }

  async fn mark_played(&self, id: i64, played_at: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
      r#"
      UPDATE requests
      SET played_at = ?
      WHERE id = ? AND played_at = 0
      "#,
    )
    .bind(played_at)
    .bind(id)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() == 1)
  }

  async fn clear_pending(&self, station_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
      r#"
      DELETE FROM requests
      WHERE station_id = ? AND played_at = 0
      "#,
    )
    .bind(station_id)
    .execute(&self.pool)
    .await?;

    tracing::info!("Cleared {} pending request(s) for station {}", result.rows_affected(), station_id);
    Ok(result.rows_affected())
  }
}

#[async_trait]
impl StationDirectory for SqliteStore {
  async fn get(&self, station_id: i64) -> Result<Option<Station>, sqlx::Error> {
    sqlx::query_as::<_, Station>(
      r#"
      SELECT id, name, enable_requests, request_threshold_minutes, request_delay_minutes, utc_offset_minutes
      FROM stations
      WHERE id = ?
      "#,
    )
    .bind(station_id)
    .fetch_optional(&self.pool)
    .await
  }

  async fn list(&self) -> Result<Vec<Station>, sqlx::Error> {
    sqlx::query_as::<_, Station>(
      r#"
      SELECT id, name, enable_requests, request_threshold_minutes, request_delay_minutes, utc_offset_minutes
      FROM stations
      ORDER BY id
      "#,
    )
    .fetch_all(&self.pool)
    .await
  }
}
