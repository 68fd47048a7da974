use std::sync::Arc;

use crate::{
  db::models::PendingRequest,
  scheduler::{RequestDelayPolicy, RequestScheduler},
  store::{CatalogLookup, PlayHistoryStore, RequestStore, StationDirectory},
  Result,
};

/// What one pass over the stations found.
#[derive(Debug, Default)]
pub struct PollReport {
  pub selected: Vec<PendingRequest>,
  pub failed: Vec<i64>,
}

/// Looks up the next playable request on every station that takes requests.
/// Marking it played is up to the playout side.
pub struct RequestWorker {
  stations: Arc<dyn StationDirectory>,
  catalog: Arc<dyn CatalogLookup>,
  history: Arc<dyn PlayHistoryStore>,
  requests: Arc<dyn RequestStore>,
}

impl RequestWorker {
  pub fn new(
    stations: Arc<dyn StationDirectory>,
    catalog: Arc<dyn CatalogLookup>,
    history: Arc<dyn PlayHistoryStore>,
    requests: Arc<dyn RequestStore>,
  ) -> Self {
    Self { stations, catalog, history, requests }
  }

  /// Only a failure to list stations aborts the pass.
  pub async fn poll(&self) -> Result<PollReport> {
    let mut report = PollReport::default();

    for station in self.stations.list().await? {
      if !station.enable_requests {
        continue;
      }

      let scheduler = RequestScheduler::new(
        self.catalog.clone(),
        self.history.clone(),
        self.requests.clone(),
        RequestDelayPolicy::for_station(&station),
      );

      match scheduler.next_playable_request(&station, None).await {
        Ok(Some(request)) => {
          tracing::info!(
            "Station {} ({}): next request {} for track {}",
            station.id,
            station.name,
            request.id,
            request.track_id
          );
          report.selected.push(request);
        }
        Ok(None) => tracing::debug!("Station {} ({}): no playable requests", station.id, station.name),
        Err(e) => {
          tracing::error!("Station {} ({}): request poll failed: {}", station.id, station.name, e);
          report.failed.push(station.id);
        }
      }
    }

    Ok(report)
  }
}
