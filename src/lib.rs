//! Harrow - web application security testing engine
//!
//! Captures and crawls HTTP traffic, analyzes every exchange passively and
//! runs attack plugins against the discovered injection points.

pub mod app;
pub mod error;
pub mod http;
pub mod proxy;
pub mod scanner;
pub mod scope;
pub mod session;
pub mod spider;

pub use error::*;
pub use session::ScanSession;
