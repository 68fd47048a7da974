use chrono::{DateTime, FixedOffset, Offset, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Station {
  pub id: i64,
  pub name: String,
  pub enable_requests: bool,
  /// Minutes used both as the recent-play window and the per-IP rate limit.
  pub request_threshold_minutes: Option<u32>,
  /// Minutes a request waits before it may play, unless it skips the delay.
  pub request_delay_minutes: Option<u32>,
  pub utc_offset_minutes: i32,
}

impl Station {
  /// Fixed offset of the station's local time. Out of range offsets fall back to UTC.
  pub fn timezone(&self) -> FixedOffset {
    FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
      .unwrap_or_else(|| Utc.fix())
  }

  /// Current time in the station's timezone.
  pub fn now(&self) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&self.timezone())
  }
}

#[derive(Debug, Clone, FromRow)]
pub struct Track {
  pub id: String,
  pub station_id: i64,
  pub title: String,
  pub artist: String,
  pub is_requestable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PendingRequest {
  pub id: i64,
  pub station_id: i64,
  pub track_id: String,
  pub ip: String,
  /// Submission time, epoch seconds.
  pub timestamp: i64,
  /// 0 until the request has been played.
  pub played_at: i64,
  pub skip_delay: i64,
}

impl PendingRequest {
  pub fn is_pending(&self) -> bool {
    self.played_at == 0
  }
}

/// A request that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewRequest {
  pub station_id: i64,
  pub track_id: String,
  pub ip: String,
  pub timestamp: i64,
  pub skip_delay: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayHistoryEntry {
  pub id: i64,
  pub station_id: i64,
  pub title: String,
  pub artist: String,
  pub timestamp_start: i64,
}
