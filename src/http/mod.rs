//! HTTP message model and outbound sender
//!
//! Everything downstream of capture operates on [`HttpMessage`].

mod client;
mod message;
mod request;
mod response;

pub use client::{send_with_retry, HttpSender, MessageSender, RetryPolicy};
pub use message::{HistoryId, HistoryType, HttpMessage};
pub use request::RequestHeader;
pub use response::{Cookie, ResponseHeader};
