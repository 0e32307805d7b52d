//! Runtime for running a data connector pass.
//!
//! `DataConnector` handles:
//! - Adapter construction from hook tags
//! - Source selection (input adapter, or the ledger in retry mode)
//! - The sequential read → send → record loop
//! - Best-effort ledger writes and ledger cleanup

mod data_connector;

pub use data_connector::DataConnector;
