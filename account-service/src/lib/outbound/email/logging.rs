use async_trait::async_trait;

use crate::account::errors::EmailDispatchError;
use crate::account::models::PasswordResetEmail;
use crate::account::ports::EmailDispatcher;

/// Dispatcher that records deliveries in the log instead of sending them.
///
/// Intended for development and for deployments where mail is relayed by a
/// separate process tailing the log. The reset token itself is never
/// written out.
#[derive(Debug, Clone, Default)]
pub struct TracingEmailDispatcher;

impl TracingEmailDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailDispatcher for TracingEmailDispatcher {
    async fn send_password_reset(
        &self,
        email: &PasswordResetEmail,
    ) -> Result<(), EmailDispatchError> {
        if email.callback_base_url.is_empty() {
            return Err(EmailDispatchError::Rejected(
                "callback base url is empty".to_string(),
            ));
        }

        tracing::info!(
            recipient = %email.recipient,
            callback_base_url = %email.callback_base_url,
            "Password reset email dispatched"
        );

        Ok(())
    }
}
