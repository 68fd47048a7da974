use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything `submit` and the scheduler can fail with.
///
/// The first seven variants are listener-facing rejections; the rest are
/// infrastructure failures that abort the operation.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Automated traffic is not allowed to submit requests")]
  AutomatedTrafficRejected,

  #[error("This station does not accept requests")]
  RequestsDisabled,

  #[error("Track not found: {0}")]
  TrackNotFound(String),

  #[error("Track is not requestable: {0}")]
  TrackNotRequestable(String),

  #[error("This track has already been requested")]
  DuplicateOutstandingRequest,

  #[error("This track or artist has been played too recently")]
  DuplicateRecentPlay,

  #[error("You have submitted a request too recently, please wait before submitting another")]
  RateLimited,

  #[error("Station not found: {0}")]
  StationNotFound(i64),

  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("Configuration error: {0}")]
  Config(String),
}

impl Error {
  /// True for rejections that should be shown to the listener as-is.
  pub fn is_rejection(&self) -> bool {
    matches!(
      self,
      Error::AutomatedTrafficRejected
        | Error::RequestsDisabled
        | Error::TrackNotFound(_)
        | Error::TrackNotRequestable(_)
        | Error::DuplicateOutstandingRequest
        | Error::DuplicateRecentPlay
        | Error::RateLimited
    )
  }
}
