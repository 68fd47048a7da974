use std::sync::Arc;

use chrono::Utc;

use crate::{
  db::models::{NewRequest, Station},
  recency::{RecencyChecker, PENDING_WINDOW_SECONDS},
  store::{AppendGuard, AppendOutcome, CatalogLookup, PlayHistoryStore, RequestStore, StationDirectory},
  traffic, Error, Result,
};

/// Rate-limit window used when a station has no threshold configured.
pub const DEFAULT_RATE_LIMIT_MINUTES: u32 = 5;

/// Any rate-limit window under a minute collapses to this many seconds.
pub const RATE_LIMIT_FLOOR_SECONDS: i64 = 15;

/// Who is submitting a request.
#[derive(Debug, Clone)]
pub struct Submitter {
  pub ip: String,
  pub user_agent: Option<String>,
  pub is_authenticated: bool,
}

impl Submitter {
  pub fn anonymous(ip: impl Into<String>, user_agent: Option<String>) -> Self {
    Self { ip: ip.into(), user_agent, is_authenticated: false }
  }
}

/// Seconds an unauthenticated IP must wait between requests.
pub fn rate_limit_seconds(threshold_minutes: Option<u32>) -> i64 {
  let seconds = i64::from(threshold_minutes.unwrap_or(DEFAULT_RATE_LIMIT_MINUTES)) * 60;
  if seconds < 60 {
    RATE_LIMIT_FLOOR_SECONDS
  } else {
    seconds
  }
}

pub struct AdmissionController {
  catalog: Arc<dyn CatalogLookup>,
  requests: Arc<dyn RequestStore>,
  stations: Arc<dyn StationDirectory>,
  recency: RecencyChecker,
}

impl AdmissionController {
  pub fn new(
    catalog: Arc<dyn CatalogLookup>,
    history: Arc<dyn PlayHistoryStore>,
    requests: Arc<dyn RequestStore>,
    stations: Arc<dyn StationDirectory>,
  ) -> Self {
    let recency = RecencyChecker::new(history, requests.clone());
    Self { catalog, requests, stations, recency }
  }

  /// Validates and enqueues a request, returning the new request id.
  pub async fn submit(&self, station: &Station, track_id: &str, submitter: &Submitter) -> Result<i64> {
    self.submit_at(station, track_id, submitter, Utc::now().timestamp()).await
  }

  /// Same as [`submit`](Self::submit) for a station looked up by id.
  pub async fn submit_to(&self, station_id: i64, track_id: &str, submitter: &Submitter) -> Result<i64> {
    let station = self
      .stations
      .get(station_id)
      .await?
      .ok_or(Error::StationNotFound(station_id))?;

    self.submit(&station, track_id, submitter).await
  }

  pub async fn submit_at(&self, station: &Station, track_id: &str, submitter: &Submitter, now: i64) -> Result<i64> {
    let result = self.admit(station, track_id, submitter, now).await;

    match &result {
      Ok(id) => tracing::info!(
        "Request {} accepted for track {} on station {} from {}",
        id,
        track_id,
        station.id,
        submitter.ip
      ),
      Err(e) if e.is_rejection() => tracing::debug!(
        "Request for track {} on station {} from {} rejected: {}",
        track_id,
        station.id,
        submitter.ip,
        e
      ),
      Err(e) => tracing::error!(
        "Request for track {} on station {} failed: {}",
        track_id,
        station.id,
        e
      ),
    }

    result
  }

  async fn admit(&self, station: &Station, track_id: &str, submitter: &Submitter, now: i64) -> Result<i64> {
    if traffic::is_automated(submitter.user_agent.as_deref()) {
      return Err(Error::AutomatedTrafficRejected);
    }

    if !station.enable_requests {
      return Err(Error::RequestsDisabled);
    }

    let track = self
      .catalog
      .find_track(station.id, track_id)
      .await?
      .ok_or_else(|| Error::TrackNotFound(track_id.to_string()))?;

    if !self.catalog.is_requestable(&track) {
      return Err(Error::TrackNotRequestable(track_id.to_string()));
    }

    self.recency.check_pending_request(&track, station, now).await?;
    self.recency.check_recent_play(&track, station, now).await?;

    let ip_since = if submitter.is_authenticated {
      None
    } else {
      let since = now - rate_limit_seconds(station.request_threshold_minutes);
      if self.requests.count_by_ip_since(&submitter.ip, since).await? > 0 {
        return Err(Error::RateLimited);
      }
      Some(since)
    };

    let request = NewRequest {
      station_id: station.id,
      track_id: track.id.clone(),
      ip: submitter.ip.clone(),
      timestamp: now,
      skip_delay: 0,
    };
    let guard = AppendGuard {
      pending_since: now - PENDING_WINDOW_SECONDS,
      ip_since,
    };

    // Another submission may have landed since the checks above.
    match self.requests.append(request, guard).await? {
      AppendOutcome::Appended(id) => Ok(id),
      AppendOutcome::PendingConflict => Err(Error::DuplicateOutstandingRequest),
      AppendOutcome::RateLimited => Err(Error::RateLimited),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::{create_pool, models::{PendingRequest, Track}, SqliteStore};
  use async_trait::async_trait;

  const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

  async fn setup(enable_requests: bool, threshold: Option<u32>) -> (Arc<SqliteStore>, AdmissionController, Station) {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    let station = store
      .create_station("Test FM", enable_requests, threshold, None, 0)
      .await
      .unwrap();

    for (id, title, artist, requestable) in [
      ("t1", "Song One", "Band One", true),
      ("t2", "Song Two", "Band Two", true),
      ("t3", "Song Three", "Band Three", false),
    ] {
      store
        .upsert_track(&Track {
          id: id.into(),
          station_id: station.id,
          title: title.into(),
          artist: artist.into(),
          is_requestable: requestable,
        })
        .await
        .unwrap();
    }

    let controller = AdmissionController::new(store.clone(), store.clone(), store.clone(), store.clone());
    (store, controller, station)
  }

  fn listener(ip: &str) -> Submitter {
    Submitter::anonymous(ip, Some(BROWSER.to_string()))
  }

  #[test]
  fn test_rate_limit_window() {
    assert_eq!(rate_limit_seconds(Some(0)), 15);
    assert_eq!(rate_limit_seconds(Some(10)), 600);
    assert_eq!(rate_limit_seconds(Some(1)), 60);
    assert_eq!(rate_limit_seconds(None), 300);
  }

  #[tokio::test]
  async fn test_disabled_station_rejects_everything() {
    let (_, controller, station) = setup(false, Some(5)).await;

    for track in ["t1", "missing", "t3"] {
      let err = controller.submit_at(&station, track, &listener("1.2.3.4"), 10_000).await.unwrap_err();
      assert!(matches!(err, Error::RequestsDisabled));
    }
  }

  #[tokio::test]
  async fn test_crawler_is_rejected_first() {
    let (store, controller, station) = setup(false, Some(5)).await;
    let bot = Submitter::anonymous("1.2.3.4", Some("Googlebot/2.1".to_string()));

    let err = controller.submit_at(&station, "t1", &bot, 10_000).await.unwrap_err();
    assert!(matches!(err, Error::AutomatedTrafficRejected));
    assert_eq!(store.count_by_ip_since("1.2.3.4", 0).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_unknown_and_unrequestable_tracks() {
    let (_, controller, station) = setup(true, Some(5)).await;

    let err = controller.submit_at(&station, "missing", &listener("1.2.3.4"), 10_000).await.unwrap_err();
    assert!(matches!(err, Error::TrackNotFound(ref id) if id == "missing"));

    let err = controller.submit_at(&station, "t3", &listener("1.2.3.4"), 10_000).await.unwrap_err();
    assert!(matches!(err, Error::TrackNotRequestable(_)));
  }

  #[tokio::test]
  async fn test_second_request_for_same_track_is_duplicate() {
    let (_, controller, station) = setup(true, Some(5)).await;

    controller.submit_at(&station, "t1", &listener("1.2.3.4"), 10_000).await.unwrap();

    // A different listener, so the rate limit does not get there first.
    let err = controller.submit_at(&station, "t1", &listener("5.6.7.8"), 10_030).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateOutstandingRequest));
  }

  #[tokio::test]
  async fn test_recently_played_track_is_rejected() {
    let (store, controller, station) = setup(true, Some(5)).await;
    store.record(station.id, "Song One", "Band One", 9_900).await.unwrap();

    let err = controller.submit_at(&station, "t1", &listener("1.2.3.4"), 10_000).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateRecentPlay));
    assert_eq!(store.count_by_ip_since("1.2.3.4", 0).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_rate_limit_applies_to_anonymous_listeners_only() {
    let (_, controller, station) = setup(true, Some(5)).await;

    controller.submit_at(&station, "t1", &listener("1.2.3.4"), 10_000).await.unwrap();

    let err = controller.submit_at(&station, "t2", &listener("1.2.3.4"), 10_299).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited));

    let member = Submitter {
      ip: "1.2.3.4".to_string(),
      user_agent: Some(BROWSER.to_string()),
      is_authenticated: true,
    };
    assert!(controller.submit_at(&station, "t2", &member, 10_299).await.is_ok());
  }

  #[tokio::test]
  async fn test_zero_threshold_uses_fifteen_second_floor() {
    let (_, controller, station) = setup(true, Some(0)).await;

    controller.submit_at(&station, "t1", &listener("1.2.3.4"), 10_000).await.unwrap();

    let err = controller.submit_at(&station, "t2", &listener("1.2.3.4"), 10_010).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited));
    assert!(controller.submit_at(&station, "t2", &listener("1.2.3.4"), 10_016).await.is_ok());
  }

  #[tokio::test]
  async fn test_submit_to_unknown_station() {
    let (_, controller, station) = setup(true, Some(5)).await;

    let err = controller.submit_to(station.id + 100, "t1", &listener("1.2.3.4")).await.unwrap_err();
    assert!(matches!(err, Error::StationNotFound(_)));
  }

  #[tokio::test]
  async fn test_rate_limit_counts_requests_on_other_stations() {
    let (store, controller, first) = setup(true, Some(5)).await;
    let second = store
      .create_station("Other FM", true, Some(5), None, 0)
      .await
      .unwrap();
    store
      .upsert_track(&Track {
        id: "y".into(),
        station_id: second.id,
        title: "Other Song".into(),
        artist: "Other Band".into(),
        is_requestable: true,
      })
      .await
      .unwrap();

    controller.submit_at(&first, "t1", &listener("9.9.9.9"), 10_000).await.unwrap();

    let err = controller.submit_at(&second, "y", &listener("9.9.9.9"), 10_100).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited));
    assert!(store.pending_for_station(second.id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_submissions_enqueue_track_once() {
    let (store, controller, station) = setup(true, Some(5)).await;
    let first = listener("1.1.1.1");
    let second = listener("2.2.2.2");

    let (a, b) = tokio::join!(
      controller.submit_at(&station, "t1", &first, 10_000),
      controller.submit_at(&station, "t1", &second, 10_000),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
      .iter()
      .any(|r| matches!(r, Err(Error::DuplicateOutstandingRequest))));
    assert_eq!(store.pending_for_station(station.id).await.unwrap().len(), 1);
  }

  /// Passes every read through but reports a fixed outcome from `append`, as
  /// when another submission wins between the checks and the insert.
  struct LosesAppendRace {
    inner: Arc<SqliteStore>,
    outcome: AppendOutcome,
  }

  #[async_trait]
  impl RequestStore for LosesAppendRace {
    async fn append(&self, _: NewRequest, _: AppendGuard) -> std::result::Result<AppendOutcome, sqlx::Error> {
      Ok(self.outcome)
    }

    async fn most_recent_pending(&self, station_id: i64, track_id: &str, since: i64) -> std::result::Result<Option<i64>, sqlx::Error> {
      self.inner.most_recent_pending(station_id, track_id, since).await
    }

    async fn count_by_ip_since(&self, ip: &str, since: i64) -> std::result::Result<i64, sqlx::Error> {
      self.inner.count_by_ip_since(ip, since).await
    }

    async fn pending_for_station(&self, station_id: i64) -> std::result::Result<Vec<PendingRequest>, sqlx::Error> {
      self.inner.pending_for_station(station_id).await
    }

    async fn find_pending(&self, station_id: i64, id: i64) -> std::result::Result<Option<PendingRequest>, sqlx::Error> {
      self.inner.find_pending(station_id, id).await
    }

    async fn mark_played(&self, id: i64, played_at: i64) -> std::result::Result<bool, sqlx::Error> {
      self.inner.mark_played(id, played_at).await
    }

    async fn clear_pending(&self, station_id: i64) -> std::result::Result<u64, sqlx::Error> {
      self.inner.clear_pending(station_id).await
    }
  }

  #[tokio::test]
  async fn test_append_conflicts_map_to_rejections() {
    let (store, _, station) = setup(true, Some(5)).await;

    for (outcome, expect_duplicate) in [
      (AppendOutcome::PendingConflict, true),
      (AppendOutcome::RateLimited, false),
    ] {
      let requests = Arc::new(LosesAppendRace { inner: store.clone(), outcome });
      let controller = AdmissionController::new(store.clone(), store.clone(), requests, store.clone());

      let err = controller.submit_at(&station, "t1", &listener("1.2.3.4"), 10_000).await.unwrap_err();
      if expect_duplicate {
        assert!(matches!(err, Error::DuplicateOutstandingRequest));
      } else {
        assert!(matches!(err, Error::RateLimited));
      }
    }
  }
}
