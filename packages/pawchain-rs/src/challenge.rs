//! Signing challenges and mint receipts.
//!
//! Users prove control of an EVM account by signing literal challenge strings
//! with EIP-191 `personal_sign`. The bridge compares the recovered address to
//! the claimed one (checksum normalisation happens implicitly by comparing
//! parsed addresses). Mint receipts authorise the user to mint wPAW on-chain:
//! the bridge signs `keccak256(abi.encode(address, uint256 amount,
//! uint256 uuid, uint256 chainId))` with its EVM key.

use alloy::primitives::{keccak256, Address, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::SolValue;
use eyre::{eyre, Result, WrapErr};

use crate::types::NativeAddress;

/// Challenge a user signs to bind a native address to their EVM account.
pub fn claim_challenge(native: &NativeAddress) -> String {
    format!(
        "I hereby claim that the native address \"{}\" is mine",
        native
    )
}

/// Challenge a user signs to authorise a withdrawal. `amount` is the literal
/// decimal string the user submitted, not a re-rendering of it.
pub fn withdraw_challenge(amount: &str, native: &NativeAddress) -> String {
    format!("Withdraw {} PAW to my wallet \"{}\"", amount, native)
}

/// Challenge a user signs to swap deposited PAW for wPAW.
pub fn swap_challenge(amount: &str, native: &NativeAddress) -> String {
    format!(
        "Swap {} PAW for wPAW with PAW I deposited from my wallet \"{}\"",
        amount, native
    )
}

/// Recover the EIP-191 signer of `message` from a hex-encoded 65-byte
/// signature.
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<Address> {
    let raw = hex::decode(signature_hex.trim_start_matches("0x"))
        .wrap_err("signature is not valid hex")?;
    if raw.len() != 65 {
        return Err(eyre!("signature must be 65 bytes, got {}", raw.len()));
    }
    let signature = Signature::try_from(raw.as_slice()).wrap_err("malformed signature")?;
    signature
        .recover_address_from_msg(message.as_bytes())
        .wrap_err("signature recovery failed")
}

/// Compute the mint-receipt digest: `keccak256(abi.encode(address evm,
/// uint256 amount, uint256 uuid, uint256 chainId))`.
pub fn mint_receipt_digest(evm: Address, amount_wei: U256, uuid: U256, chain_id: u64) -> B256 {
    let payload = (evm, amount_wei, uuid, U256::from(chain_id)).abi_encode();
    keccak256(payload)
}

/// A signed mint receipt, idempotent on-chain via its uuid.
#[derive(Debug, Clone)]
pub struct MintReceipt {
    /// Hex-encoded 65-byte signature over the receipt digest.
    pub receipt: String,
    pub uuid: U256,
}

/// Signs mint receipts with the bridge's EVM key.
pub struct MintReceiptSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl MintReceiptSigner {
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| eyre!("invalid bridge EVM key: {}", e))?;
        Ok(Self { signer, chain_id })
    }

    pub fn from_signer(signer: PrivateKeySigner, chain_id: u64) -> Self {
        Self { signer, chain_id }
    }

    /// The bridge's signing address, as verified by the wPAW contract.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a receipt authorising `evm` to mint `amount_wei` of wPAW.
    ///
    /// The 32-byte digest itself is signed with `personal_sign` semantics,
    /// matching the contract's `toEthSignedMessageHash` check.
    pub fn sign(&self, evm: Address, amount_wei: U256, uuid: U256) -> Result<MintReceipt> {
        let digest = mint_receipt_digest(evm, amount_wei, uuid, self.chain_id);
        let signature = self
            .signer
            .sign_message_sync(digest.as_slice())
            .wrap_err("failed to sign mint receipt")?;
        Ok(MintReceipt {
            receipt: format!("0x{}", hex::encode(signature.as_bytes())),
            uuid,
        })
    }
}
