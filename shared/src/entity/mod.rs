pub mod signal_updates;
pub mod signals;
