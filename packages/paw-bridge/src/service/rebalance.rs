//! Hot→cold sweep policy.
//!
//! Runs after every successful deposit. The sweep never dips the hot wallet
//! under its reserve, only fires while the hot wallet holds more than its
//! target share of total custody, and is sized by the deposit that triggered
//! it (floored to whole PAW), so a single sweep is bounded by the event that
//! caused it.

use alloy::primitives::U256;

use pawchain_rs::types::floor_to_whole_paw;

/// Pure sweep-sizing policy; chain reads and the transfer live in the
/// service.
#[derive(Debug, Clone)]
pub struct RebalancePolicy {
    /// Minimum balance kept in the hot wallet, atomic units
    pub reserve_units: U256,
    /// Hot wallet's target share of total custody, percent (0..=100)
    pub hot_ratio_pct: u32,
}

impl RebalancePolicy {
    /// Amount to move hot→cold after crediting `deposit` units, or zero.
    pub fn cold_send(&self, hot: U256, cold: U256, deposit: U256) -> U256 {
        if hot <= self.reserve_units {
            return U256::ZERO;
        }
        // Below the target share of custody the hot wallet keeps everything
        let ratio = U256::from(self.hot_ratio_pct);
        if hot * U256::from(100u64) <= (hot + cold) * ratio {
            return U256::ZERO;
        }

        let headroom = hot - self.reserve_units;
        let chunk = floor_to_whole_paw(deposit).min(headroom);
        chunk * (U256::from(100u64) - ratio) / U256::from(100u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawchain_rs::types::parse_paw;

    fn policy(reserve: &str, ratio: u32) -> RebalancePolicy {
        RebalancePolicy {
            reserve_units: parse_paw(reserve).unwrap(),
            hot_ratio_pct: ratio,
        }
    }

    fn paw(s: &str) -> U256 {
        parse_paw(s).unwrap()
    }

    #[test]
    fn test_cold_send_table() {
        // (reserve, hot, cold, deposit) -> expected cold transfer, at 20%
        let cases = [
            ("2", "50", "0", "10", "8"),
            ("5", "12", "0", "12", "5.6"),
            ("0", "1", "0", "11", "0.8"),
            ("20", "30", "0", "10", "8"),
            ("2", "50", "0", "4.12", "3.2"),
        ];
        for (reserve, hot, cold, deposit, expected) in cases {
            let send = policy(reserve, 20).cold_send(paw(hot), paw(cold), paw(deposit));
            assert_eq!(
                send,
                paw(expected),
                "reserve={} hot={} cold={} deposit={}",
                reserve,
                hot,
                cold,
                deposit
            );
        }
    }

    #[test]
    fn test_no_sweep_below_reserve() {
        assert_eq!(
            policy("10", 20).cold_send(paw("5"), paw("0"), paw("5")),
            U256::ZERO
        );
        // Exactly at the reserve also holds back
        assert_eq!(
            policy("10", 20).cold_send(paw("10"), paw("0"), paw("5")),
            U256::ZERO
        );
    }

    #[test]
    fn test_no_sweep_below_ratio_target() {
        // Hot holds 10% of custody, target is 20%
        assert_eq!(
            policy("0", 20).cold_send(paw("10"), paw("90"), paw("5")),
            U256::ZERO
        );
    }

    #[test]
    fn test_small_deposit_floors_to_zero() {
        assert_eq!(
            policy("2", 20).cold_send(paw("50"), paw("0"), paw("0.9")),
            U256::ZERO
        );
    }

    #[test]
    fn test_sweep_respects_reserve_headroom() {
        // Headroom is hot - reserve = 3; deposit chunk of 10 is capped to it
        let send = policy("5", 20).cold_send(paw("8"), paw("0"), paw("10"));
        assert_eq!(send, paw("2.4"));
        // The hot wallet retains at least the reserve after sending
        assert!(paw("8") - send >= paw("5"));
    }
}
