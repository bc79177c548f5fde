//! FuelTrack application crate: configuration, the SQLite local cache, HTTP
//! clients for the sync server, and the sync server itself.

pub mod config;
pub mod db;
pub mod remote;
pub mod server;
