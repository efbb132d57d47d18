//! Pawchain-RS: Shared Chain Library for the PAW Bridge
//!
//! This crate provides the chain-facing functionality shared by the bridge
//! service and its tests:
//!
//! - **Types** - Native address newtype, atomic-unit amount arithmetic,
//!   decimal-string parsing and formatting
//! - **Challenges** - Signing challenge construction, EIP-191 recovery,
//!   mint-receipt digest computation and signing
//! - **EVM Module** - wPAW contract bindings, log parsing, HTTP client
//! - **L1 Module** - PAW node RPC client, confirmation websocket subscription
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! pawchain-rs = { path = "../pawchain-rs" }
//! ```

pub mod challenge;
pub mod evm;
pub mod l1;
pub mod redact;
pub mod types;

// Re-export commonly used items at the crate root
pub use challenge::{
    claim_challenge, mint_receipt_digest, recover_signer, swap_challenge, withdraw_challenge,
    MintReceipt, MintReceiptSigner,
};
pub use types::{
    format_paw, has_sub_cent_precision, parse_paw, raw_to_units, units_to_raw, units_to_wrapped_wei,
    wrapped_wei_to_units, NativeAddress, NATIVE_DECIMALS, WRAPPED_DECIMALS,
};
