//! CLI command implementations.
//!
//! Each command writes its output to a caller-supplied writer so it can be
//! exercised without a terminal.

pub mod cat;
pub mod cp;
pub mod ls;
pub mod stat;
pub mod watch;
