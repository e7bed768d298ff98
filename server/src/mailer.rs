use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use shared::types::TokenView;
use tracing::{error, info, warn};

/// Delivery attempts before a message is given up on.
const SEND_ATTEMPTS: u32 = 3;

/// Pause between failed attempts.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Everything a welcome/activation email needs.
#[derive(Debug, Clone)]
pub struct ActivationMessage {
    pub recipient: String,
    pub name: String,
    pub user_id: i64,
    pub token: TokenView,
}

/// Outbound mail delivery. Implementations may block; they are always run
/// on the blocking pool.
pub trait Mailer: Send + Sync + Debug + 'static {
    fn send_activation(&self, message: &ActivationMessage) -> anyhow::Result<()>;
}

/// Writes the activation message to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_activation(&self, message: &ActivationMessage) -> anyhow::Result<()> {
        info!(
            recipient = %message.recipient,
            user_id = message.user_id,
            token = %message.token.token,
            expiry = %message.token.expiry,
            "Activation email for {}",
            message.name
        );
        Ok(())
    }
}

/// Try to deliver `message` up to three times, sleeping between attempts.
/// Returns the last failure once every attempt is spent.
pub async fn deliver_activation(mailer: Arc<dyn Mailer>, message: ActivationMessage) -> anyhow::Result<()> {
    let message = Arc::new(message);
    let mut attempt = 1;

    loop {
        let mailer = mailer.clone();
        let msg = message.clone();
        let outcome = match tokio::task::spawn_blocking(move || mailer.send_activation(&msg)).await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("mailer task failed: {}", e)),
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if attempt < SEND_ATTEMPTS => {
                warn!(user_id = message.user_id, attempt, "Activation email failed, retrying: {:#}", e);
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Send in the background. The caller never waits on delivery and a failed
/// or panicking mailer is logged, not propagated.
pub fn dispatch_activation(mailer: Arc<dyn Mailer>, message: ActivationMessage) {
    tokio::spawn(async move {
        let user_id = message.user_id;
        if let Err(e) = deliver_activation(mailer, message).await {
            error!(user_id, "Failed to send activation email: {:#}", e);
        }
    });
}
