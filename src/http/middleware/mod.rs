//! Middleware wrapped around every served router.

pub mod keep_alive;
pub mod request_logger;

pub use keep_alive::{keep_alive, KeepAlive};
pub use request_logger::{request_logger, resolve_ip};
