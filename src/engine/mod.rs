//! Play Engine (C6) and its immediate collaborators: the exec-adapter
//! boundary (spec.md §6), order/position/account shapes, the optional
//! state store, and engine-level error kinds (spec.md §7). The bar-loop
//! orchestrator itself lives in `play_engine.rs`.

pub mod error;
pub mod exec_adapter;
pub mod order_intent;
pub mod play_engine;
pub mod state_store;
pub mod sweep;

pub use error::{DataError, EngineError};
pub use exec_adapter::{ExecAdapter, SimAdapter};
pub use order_intent::{AccountState, OrderIntent, OrderKind, OrderResult, OrderSide, Position, PositionSide};
pub use play_engine::{BarOutcome, ClosedBars, EntryDecision, ExitDecision, PlayEngine};
pub use state_store::{EngineSnapshot, FileStateStore, InMemoryStateStore, StateStore, StateStoreError};
pub use sweep::{run_sweep, SweepJob, SweepOutcome};
