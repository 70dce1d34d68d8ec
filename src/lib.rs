//! Probe address ranges for HTTPS services that are only reachable through a
//! forward proxy's CONNECT tunnel, and keep the interesting responses.

pub mod engine;
pub mod error;
pub mod http;
pub mod input;
pub mod model;
pub mod output;
pub mod persist;
pub mod tls;
pub mod transport;
pub mod tunnel;
pub mod util;
