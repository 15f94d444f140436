//! Outbound delivery of verification codes and reset tokens
//!
//! Sinks are fire-and-forget: `deliver` never blocks and never fails the
//! calling flow.

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Secret handed to the account owner out of band
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMessage {
    VerificationCode { email: String, code: String },
    PasswordReset { email: String, token: String },
}

impl DeliveryMessage {
    pub fn email(&self) -> &str {
        match self {
            Self::VerificationCode { email, .. } | Self::PasswordReset { email, .. } => email,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerificationCode { .. } => "verification_code",
            Self::PasswordReset { .. } => "password_reset",
        }
    }
}

pub trait DeliverySink: Send + Sync {
    fn deliver(&self, message: DeliveryMessage);
}

/// Writes deliveries to the log. Secrets are only included when
/// `reveal_secrets` is set (development).
#[derive(Debug, Clone, Default)]
pub struct LogDelivery {
    reveal_secrets: bool,
}

impl LogDelivery {
    pub fn new(reveal_secrets: bool) -> Self {
        Self { reveal_secrets }
    }
}

impl DeliverySink for LogDelivery {
    fn deliver(&self, message: DeliveryMessage) {
        if !self.reveal_secrets {
            info!(kind = message.kind(), email = %message.email(), "Delivery queued");
            return;
        }

        match &message {
            DeliveryMessage::VerificationCode { email, code } => {
                info!(kind = message.kind(), email = %email, code = %code, "Delivery queued");
            }
            DeliveryMessage::PasswordReset { email, token } => {
                info!(kind = message.kind(), email = %email, token = %token, "Delivery queued");
            }
        }
    }
}

/// Forwards deliveries to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    tx: mpsc::UnboundedSender<DeliveryMessage>,
}

impl ChannelDelivery {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveryMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DeliverySink for ChannelDelivery {
    fn deliver(&self, message: DeliveryMessage) {
        if self.tx.send(message).is_err() {
            warn!("Delivery receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivery() {
        let (sink, mut rx) = ChannelDelivery::new();
        sink.deliver(DeliveryMessage::VerificationCode {
            email: "a@example.com".to_string(),
            code: "123456".to_string(),
        });

        let message = rx.try_recv().unwrap();
        assert_eq!(message.email(), "a@example.com");
        assert_eq!(message.kind(), "verification_code");
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (sink, rx) = ChannelDelivery::new();
        drop(rx);
        sink.deliver(DeliveryMessage::PasswordReset {
            email: "a@example.com".to_string(),
            token: "t".to_string(),
        });
    }
}
