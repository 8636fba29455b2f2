// Controller role: turn loop, live reporting and key handling
pub mod engine;
pub mod events;
pub mod keys;

pub use engine::{Controller, RunOutcome, Snapshot};
pub use events::{Event, State};
pub use keys::{spawn_key_reader, KeyCommand, RawModeGuard};
