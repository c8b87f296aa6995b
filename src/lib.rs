//! slsvcd - Straylight IRC services daemon.
//!
//! Links to an IRC network as a server and provides operator services over
//! it. Two server-to-server dialects are supported: UnrealIRCd 6 and
//! InspIRCd (protocol 1205/1206).
//!
//! - [`session`]: the uplink link, burst, restart and rehash
//! - [`protocol`]: the per-dialect command builders and parsers
//! - [`handlers`]: inbound wire handlers
//! - [`commands`]: operator chat commands
//! - [`modules`]: loadable command modules
//! - [`sasl`]: SASL relay state
//! - [`state`]: in-memory network registries
//! - [`db`]: SQLite persistence

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod modules;
pub mod protocol;
pub mod sasl;
pub mod security;
pub mod session;
pub mod state;
