// Shared mutable state of the engine and the queues that guard it.
mod cursor;
mod lanes;
mod store;

pub use self::cursor::{CursorRegistry, PageRequest, Scope, ScopeState};
pub use self::lanes::{LaneGuard, Lanes};
pub use self::store::{EntityStore, StoreError};
