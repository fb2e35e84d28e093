//! Payment lifecycle: the state machine and the online gateway.

mod gateway;
mod state;

pub use gateway::*;
pub use state::*;
