//! # Loyalty server
//! Runs the accrual reconciliation core as a standalone process. On start-up the server
//! * opens (and migrates) the loyalty database,
//! * starts the job dispatcher against the configured accrual service,
//! * re-queues every order that has not reached a terminal status,
//! * logs job statistics periodically,
//!
//! and on Ctrl-C it shuts the dispatcher down, waits for every job to stop and closes the database.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information, or run
//! the binary with any argument to print the full list.
pub mod cli;
pub mod config;
pub mod errors;
pub mod server;
pub mod stats_worker;
