//! EVM chain support: wPAW contract bindings and the HTTP client.

pub mod client;
pub mod contracts;

pub use client::{EvmClient, HttpEvmClient, SwapToNativeEvent};
