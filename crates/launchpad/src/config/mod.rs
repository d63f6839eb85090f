//! Profile store configuration and migration

mod migrate;
mod profile_store;

pub use migrate::migrate;
pub use profile_store::*;
