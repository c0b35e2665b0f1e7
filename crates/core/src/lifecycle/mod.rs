//! Process lifecycle helpers: logging initialization and shutdown signals.

pub mod logging;
pub mod signal;
