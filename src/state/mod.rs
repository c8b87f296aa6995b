//! In-memory network state.
//!
//! - [`registry`]: the generic keyed registry with a nickname index
//! - [`entities`]: users, admins, clients, clones, reputation and servers
//! - [`channel`]: channel membership with auto-pruning
//! - [`matrix`]: the lock that owns every registry, plus cascades
//! - [`clones`]: unique clone identity generation
//! - [`uid`]: UID allocation for our own pseudo-users

mod channel;
mod clones;
mod entities;
mod matrix;
mod registry;
mod uid;

pub use channel::{Channel, ChannelRegistry};
pub use clones::generate_clone;
pub use entities::{Admin, Client, CloneUser, Reputation, Server, User, apply_mode_change};
pub use matrix::{Departure, Matrix, Registries};
pub use registry::{Entity, Registry};
pub use uid::UidGenerator;
