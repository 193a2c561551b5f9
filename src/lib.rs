//! Benchmark of session reuse strategies over a two-table SQLite schema.
//!
//! A [`ContextProvider`] hands out [`Session`]s: the dynamic provider creates a
//! new one per call, the static provider shares one for its whole lifetime.
//! Sessions keep an identity map of the contacts and accounts they load and
//! flush pending writes on [`Session::save_changes`]. [`run_test`] times the
//! same fetch-link-save loop under either provider.

pub mod config;
mod error;
pub mod model;
pub mod provider;
pub mod runner;
pub mod seed;
pub mod session;
pub mod store;
pub mod timer;

pub use config::{Config, ConfigError, Workload};
pub use error::{Error, Result};
pub use model::{track, Account, AccountId, Contact, ContactId, Tracked};
pub use provider::{Context, ContextProvider, DynamicContextProvider, StaticContextProvider};
pub use runner::{run_test, RunReport};
pub use seed::{add_some_contacts, recreate_database, setup_database};
pub use session::{Database, SaveSummary, Session, SessionStats};
pub use store::{ConnectionString, JournalMode, Synchronous};
pub use timer::{format_millis, time_test};
