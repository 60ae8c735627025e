//! Domain layer: the pure round/term state machine.
//!
//! Everything here is synchronous and side-effect free; the service
//! layer owns I/O, time and persistence.

mod behaviour;
mod error;
mod evil_miner;
mod lib_calculator;
mod miner;
mod mining_time;
mod proposal;
mod randomness;
mod round;
mod round_generation;
mod term;

pub use behaviour::*;
pub use error::*;
pub use evil_miner::*;
pub use lib_calculator::*;
pub use miner::*;
pub use mining_time::*;
pub use proposal::*;
pub use randomness::*;
pub use round::*;
pub use round_generation::*;
pub use term::*;
