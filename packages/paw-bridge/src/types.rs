//! Job payloads and queue topics.
//!
//! Amounts travel in payloads as decimal strings: ledger atomic units for
//! chain-observed jobs (deposit, swap-to-native), the user's literal PAW
//! string for user-submitted jobs (withdrawal, swap-to-wrapped) — the
//! signature challenge embeds that string verbatim, so it must survive
//! round-trips unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue topics, one single worker each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Deposit,
    Withdrawal,
    SwapToWrapped,
    SwapToNative,
    EvmScan,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Deposit => "deposit",
            Topic::Withdrawal => "withdrawal",
            Topic::SwapToWrapped => "swap-to-wrapped",
            Topic::SwapToNative => "swap-to-native",
            Topic::EvmScan => "evm-scan",
        }
    }

    pub fn parse(s: &str) -> Option<Topic> {
        match s {
            "deposit" => Some(Topic::Deposit),
            "withdrawal" => Some(Topic::Withdrawal),
            "swap-to-wrapped" => Some(Topic::SwapToWrapped),
            "swap-to-native" => Some(Topic::SwapToNative),
            "evm-scan" => Some(Topic::EvmScan),
            _ => None,
        }
    }

    pub fn all() -> [Topic; 5] {
        [
            Topic::Deposit,
            Topic::Withdrawal,
            Topic::SwapToWrapped,
            Topic::SwapToNative,
            Topic::EvmScan,
        ]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed send toward the hot wallet, produced by the L1 watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositJob {
    /// Sender's native address
    pub native: String,
    /// Amount in atomic units (decimal string)
    pub amount: String,
    pub ts_ms: i64,
    /// L1 send-block hash
    pub hash: String,
}

impl DepositJob {
    pub fn job_id(&self) -> String {
        format!("deposit-{}-{}", self.native, self.hash)
    }
}

/// A user withdrawal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalJob {
    pub native: String,
    /// The user's literal decimal PAW string; signed inside the challenge
    pub amount: String,
    pub evm: String,
    /// Absent on delayed-retry replacements: the first attempt validated it
    #[serde(default)]
    pub signature: Option<String>,
    pub ts_ms: i64,
    #[serde(default)]
    pub attempt: u32,
}

impl WithdrawalJob {
    pub fn job_id(&self) -> String {
        format!("withdrawal-{}-{}", self.native, self.ts_ms)
    }

    pub fn pending_job_id(&self) -> String {
        format!(
            "pending-withdrawal-{}-{}-attempt-{}",
            self.native, self.ts_ms, self.attempt
        )
    }
}

/// A user swap of deposited PAW into wPAW.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapToWrappedJob {
    pub native: String,
    /// The user's literal decimal PAW string, as signed
    pub amount: String,
    pub evm: String,
    pub signature: String,
    pub ts_ms: i64,
}

impl SwapToWrappedJob {
    pub fn job_id(&self) -> String {
        format!("swap-to-wrapped-{}-{}", self.native, self.ts_ms)
    }
}

/// A wPAW burn observed on the EVM chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapToNativeJob {
    pub evm: String,
    pub native: String,
    /// Amount in atomic units (decimal string)
    pub amount: String,
    /// Burner's remaining wPAW balance in wei, for reporting
    pub wrapped_balance: String,
    pub hash: String,
    /// block.timestamp × 1000
    pub ts_ms: i64,
}

impl SwapToNativeJob {
    pub fn job_id(&self) -> String {
        format!("swap-to-native-{}-{}", self.evm, self.hash)
    }
}

/// A catch-up scan over an EVM block range (inclusive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmScanJob {
    pub from: u64,
    pub to: u64,
}

impl EvmScanJob {
    pub fn job_id(&self) -> String {
        format!("evm-scan-{}-{}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_roundtrip() {
        for topic in Topic::all() {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::parse("unknown"), None);
    }

    #[test]
    fn test_job_ids_are_natural_keys() {
        let withdrawal = WithdrawalJob {
            native: "paw_1abc".to_string(),
            amount: "150".to_string(),
            evm: "0xA".to_string(),
            signature: None,
            ts_ms: 1_700_000_000_000,
            attempt: 2,
        };
        assert_eq!(withdrawal.job_id(), "withdrawal-paw_1abc-1700000000000");
        assert_eq!(
            withdrawal.pending_job_id(),
            "pending-withdrawal-paw_1abc-1700000000000-attempt-2"
        );

        let scan = EvmScanJob { from: 10, to: 1009 };
        assert_eq!(scan.job_id(), "evm-scan-10-1009");
    }

    #[test]
    fn test_withdrawal_payload_defaults() {
        // Replacement payloads written by earlier versions carry no
        // attempt/signature fields
        let job: WithdrawalJob = serde_json::from_str(
            r#"{"native":"paw_1abc","amount":"5","evm":"0xA","ts_ms":1}"#,
        )
        .unwrap();
        assert_eq!(job.attempt, 0);
        assert!(job.signature.is_none());
    }
}
