//! PAW native-chain support: node RPC client and the confirmation
//! websocket subscription.

pub mod client;
pub mod ws;

pub use client::{L1Client, PawNodeClient, Receivable};
pub use ws::{spawn_confirmation_stream, ConfirmationMessage};
