mod log_manager;

pub use log_manager::*;
