use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use rand::Rng;

use crate::{
  db::models::{PendingRequest, Station},
  recency::RecencyChecker,
  store::{CatalogLookup, PlayHistoryStore, RequestStore},
  Error, Result,
};

/// Minutes a request waits before it may play when the station sets no delay.
pub const DEFAULT_REQUEST_DELAY_MINUTES: u32 = 5;

/// Decides whether a pending request may be played at `now`.
pub trait PlayPolicy: Send + Sync {
  fn should_play_now(&self, request: &PendingRequest, now: DateTime<FixedOffset>) -> bool;
}

impl<F> PlayPolicy for F
where
  F: Fn(&PendingRequest, DateTime<FixedOffset>) -> bool + Send + Sync,
{
  fn should_play_now(&self, request: &PendingRequest, now: DateTime<FixedOffset>) -> bool {
    self(request, now)
  }
}

/// Every pending request is eligible.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayImmediately;

impl PlayPolicy for PlayImmediately {
  fn should_play_now(&self, _request: &PendingRequest, _now: DateTime<FixedOffset>) -> bool {
    true
  }
}

/// Holds a request back for a delay after submission, optionally stretched by
/// a random amount of up to the same delay. Requests with a skip delay go
/// straight through.
#[derive(Debug, Clone, Copy)]
pub struct RequestDelayPolicy {
  pub delay_minutes: u32,
  pub jitter: bool,
}

impl RequestDelayPolicy {
  pub fn for_station(station: &Station) -> Self {
    Self {
      delay_minutes: station
        .request_delay_minutes
        .unwrap_or(DEFAULT_REQUEST_DELAY_MINUTES),
      jitter: true,
    }
  }
}

impl PlayPolicy for RequestDelayPolicy {
  fn should_play_now(&self, request: &PendingRequest, now: DateTime<FixedOffset>) -> bool {
    if request.skip_delay > 0 {
      return true;
    }

    let mut minutes = i64::from(self.delay_minutes);
    if self.jitter && minutes > 0 {
      minutes += rand::thread_rng().gen_range(0..=minutes);
    }

    now.timestamp() > request.timestamp + minutes * 60
  }
}

pub struct RequestScheduler<P = RequestDelayPolicy> {
  catalog: Arc<dyn CatalogLookup>,
  requests: Arc<dyn RequestStore>,
  recency: RecencyChecker,
  policy: P,
}

impl<P: PlayPolicy> RequestScheduler<P> {
  pub fn new(
    catalog: Arc<dyn CatalogLookup>,
    history: Arc<dyn PlayHistoryStore>,
    requests: Arc<dyn RequestStore>,
    policy: P,
  ) -> Self {
    let recency = RecencyChecker::new(history, requests.clone());
    Self { catalog, requests, recency, policy }
  }

  /// First pending request, in priority order, that the policy allows and
  /// that does not repeat something played recently. Marks nothing as played.
  pub async fn next_playable_request(
    &self,
    station: &Station,
    now: Option<DateTime<FixedOffset>>,
  ) -> Result<Option<PendingRequest>> {
    let now = now.unwrap_or_else(|| station.now());
    let pending = self.requests.pending_for_station(station.id).await?;

    for request in pending {
      if !self.policy.should_play_now(&request, now) {
        continue;
      }

      let Some(track) = self.catalog.find_track(station.id, &request.track_id).await? else {
        tracing::warn!(
          "Skipping request {}: track {} is no longer in the catalog",
          request.id,
          request.track_id
        );
        continue;
      };

      match self.recency.check_recent_play(&track, station, now.timestamp()).await {
        Ok(()) => {
          tracing::debug!("Request {} is next on station {}", request.id, station.id);
          return Ok(Some(request));
        }
        Err(Error::DuplicateRecentPlay) => {
          tracing::debug!("Skipping request {}: played too recently", request.id);
        }
        Err(e) => return Err(e),
      }
    }

    Ok(None)
  }
}
