use std::{env, time::Duration};

use crate::Error;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub poll_interval: Duration,
}

impl Config {
  pub fn from_env() -> Result<Self, Error> {
    let database_url = env::var("DATABASE_URL")
      .unwrap_or_else(|_| "sqlite://stationq.db".to_string());

    let poll_interval_secs: u64 = env::var("POLL_INTERVAL_SECS")
      .unwrap_or_else(|_| "30".to_string())
      .parse()
      .map_err(|e| Error::Config(format!("Invalid POLL_INTERVAL_SECS: {}", e)))?;

    if poll_interval_secs == 0 {
      return Err(Error::Config("POLL_INTERVAL_SECS must be at least 1".to_string()));
    }

    Ok(Self {
      database_url,
      poll_interval: Duration::from_secs(poll_interval_secs),
    })
  }
}
