//! Confirmation websocket subscription.
//!
//! A task owns the socket: it connects, subscribes to confirmations for the
//! watched account, and forwards send-block confirmations into an mpsc
//! channel. On any socket error or close it reconnects immediately — the 60 s
//! receivable sweep reconciles anything missed while the socket was down, so
//! the reconnect path stays simple.

use eyre::{Result, WrapErr};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::types::NativeAddress;

/// A confirmed send block observed on the watched account.
#[derive(Debug, Clone)]
pub struct ConfirmationMessage {
    pub sender: String,
    pub receiver: String,
    /// Amount in node raw
    pub amount_raw: String,
    pub hash: String,
}

#[derive(Debug, Deserialize)]
struct WsEnvelope {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    message: Option<WsConfirmation>,
}

#[derive(Debug, Deserialize)]
struct WsConfirmation {
    account: String,
    amount: String,
    hash: String,
    block: WsBlock,
}

#[derive(Debug, Deserialize)]
struct WsBlock {
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    link_as_account: Option<String>,
}

/// Spawn the subscription task. Messages arrive on `tx`; the task runs until
/// the receiver is dropped.
pub fn spawn_confirmation_stream(
    ws_url: String,
    account: NativeAddress,
    tx: mpsc::Sender<ConfirmationMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match run_subscription(&ws_url, &account, &tx).await {
                Ok(()) => {
                    tracing::warn!(url = %ws_url, "confirmation socket closed, reconnecting");
                }
                Err(e) => {
                    tracing::warn!(url = %ws_url, error = %e, "confirmation socket error, reconnecting");
                }
            }
            if tx.is_closed() {
                tracing::info!("confirmation stream consumer gone, stopping");
                return;
            }
        }
    })
}

async fn run_subscription(
    ws_url: &str,
    account: &NativeAddress,
    tx: &mpsc::Sender<ConfirmationMessage>,
) -> Result<()> {
    let (stream, _) = connect_async(ws_url)
        .await
        .wrap_err("websocket connect failed")?;
    let (mut sink, mut source) = stream.split();

    let subscribe = json!({
        "action": "subscribe",
        "topic": "confirmation",
        "options": { "accounts": [account.as_str()] },
    });
    sink.send(Message::Text(subscribe.to_string()))
        .await
        .wrap_err("failed to send subscription")?;

    tracing::info!(account = %account, "subscribed to confirmations");

    while let Some(frame) = source.next().await {
        let frame = frame.wrap_err("websocket read failed")?;
        let text = match frame {
            Message::Text(text) => text,
            Message::Ping(payload) => {
                sink.send(Message::Pong(payload)).await.ok();
                continue;
            }
            Message::Close(_) => return Ok(()),
            _ => continue,
        };

        let envelope: WsEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable socket frame");
                continue;
            }
        };
        if envelope.topic.as_deref() != Some("confirmation") {
            continue;
        }
        let Some(confirmation) = envelope.message else {
            continue;
        };
        // Only send blocks move coin toward the watched account
        if confirmation.block.subtype.as_deref() != Some("send") {
            continue;
        }
        let Some(receiver) = confirmation.block.link_as_account else {
            tracing::debug!(hash = %confirmation.hash, "send confirmation without link, ignoring");
            continue;
        };

        let message = ConfirmationMessage {
            sender: confirmation.account,
            receiver,
            amount_raw: confirmation.amount,
            hash: confirmation.hash,
        };
        if tx.send(message).await.is_err() {
            return Ok(());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confirmation_frame() {
        let json = r#"{
            "topic": "confirmation",
            "message": {
                "account": "paw_1sender",
                "amount": "1000000000000000000",
                "hash": "ABCD",
                "block": {"subtype": "send", "link_as_account": "paw_1hot"}
            }
        }"#;
        let envelope: WsEnvelope = serde_json::from_str(json).unwrap();
        let message = envelope.message.unwrap();
        assert_eq!(message.account, "paw_1sender");
        assert_eq!(message.block.subtype.as_deref(), Some("send"));
        assert_eq!(message.block.link_as_account.as_deref(), Some("paw_1hot"));
    }

    #[test]
    fn test_parse_non_confirmation_frame() {
        let envelope: WsEnvelope = serde_json::from_str(r#"{"ack": "subscribe"}"#).unwrap();
        assert!(envelope.topic.is_none());
        assert!(envelope.message.is_none());
    }
}
