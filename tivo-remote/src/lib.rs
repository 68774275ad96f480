//! # tivo-remote: Command-Line Remote
//!
//! Front end over `tivo-core`: loads the identity→host table and network
//! settings, listens for beacons, and runs one remote-control command
//! (or keeps listening and logging device events with `listen`).

pub mod commands;
pub mod config;
