//! wPAW contract ABI definitions.
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the wrapped
//! token contract. The bridge only needs the burn event and the balance view;
//! minting is user-initiated with an off-chain receipt and never called from
//! here.

use alloy::sol;

sol! {
    /// Wrapped PAW token interface (subset used by the bridge)
    #[sol(rpc)]
    contract WrappedPaw {
        /// Emitted when a holder burns wPAW to swap back to native PAW.
        /// `paw` is the destination native address as a literal string.
        event SwapToNative(address indexed from, string paw, uint256 amount);

        /// wPAW balance of an account
        function balanceOf(address account) external view returns (uint256);
    }
}
