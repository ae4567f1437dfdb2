//! Audio engine - stem chains, master bus, commands
//!
//! Core engine components:
//! - StemChain: per-stem effect pipeline over a looped variable-rate source
//! - MasterBus: master gain, stutter/tape/build automations, limiter, meter
//! - RemixEngine: ties chains, send buses and master together
//! - Lock-free command queue between control and audio threads
//! - RT-safe deferred deallocation for stem buffers

mod chain;
mod command;
pub mod gc;
mod master;
mod player;

pub use chain::*;
pub use command::*;
pub use master::*;
pub use player::*;
