//! Runtime components: entries, the launch queue, process tracking and the sequencer

pub mod entry;
pub mod events;
pub mod process;
pub mod queue;
pub mod registry;
pub mod sequence;

#[cfg(test)]
pub(crate) mod fake;

pub use entry::*;
pub use events::*;
pub use process::*;
pub use queue::*;
pub use registry::*;
pub use sequence::*;
