pub mod decision;
pub mod execution_loop;
pub mod state;

pub use decision::{grid_decision, GridDecision, GridDecisionError, GridParameters};
pub use execution_loop::{ExecutionLoop, ExecutionLoopConfig};
pub use state::{Lot, SideState, SymbolState};
