//! Listener song requests for radio stations: admission into a per-station
//! queue and selection of the next request to play.

pub mod admission;
pub mod config;
pub mod db;
pub mod error;
pub mod recency;
pub mod scheduler;
pub mod store;
pub mod traffic;
pub mod worker;

pub use admission::{AdmissionController, Submitter};
pub use error::{Error, Result};
pub use scheduler::{PlayImmediately, PlayPolicy, RequestDelayPolicy, RequestScheduler};
pub use worker::RequestWorker;
