//! Typed representations of MRT records, peers, and staged archive files.

pub mod file;
pub mod mrt;
pub mod network;
pub mod peer;

pub use file::*;
pub use mrt::*;
pub use network::*;
pub use peer::*;
