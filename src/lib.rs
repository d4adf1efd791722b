pub mod adapter;
pub mod clock;
pub mod command;
pub mod config;
pub mod context;
pub mod duel;
pub mod error;
pub mod handicap;
pub mod integration;
pub mod judge;
pub mod multi;
pub mod rating;
pub mod scheduler;
pub mod selector;
pub mod stats;
pub mod store;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use command::{Arena, Command, Reply};
pub use config::DuelConfig;
pub use context::{Collaborators, DuelContext};
pub use duel::DuelOrchestrator;
pub use error::{DuelError, Precondition, Result};
pub use multi::MultiplayerOrchestrator;
pub use stats::Stats;
