//! `flitelog` - fleet flight-log compliance engine
//!
//! This library tracks the two-tier signing lifecycle of flight records
//! (pilot first, then operator), enforces per-tier signature deadlines,
//! files completed records with the external regulator, and maintains a
//! trailing 30-day compliance-window cache per aircraft.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod audit;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod deadline;
pub mod error;
pub mod hash;
pub mod logging;
pub mod notify;
pub mod record;
pub mod regulator;
pub mod report;
pub mod repository;
pub mod scheduler;
pub mod signing;
pub mod storage;
pub mod sweep;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::{Aircraft, ComplianceState, FlightRecord, RegulatoryClass, SignatureRecord};
pub use repository::RecordRepository;
pub use storage::SqliteRepository;
