//! Liveliness tokens for presence detection.
//!
//! The address-space host declares a token at `<prefix>/@/alive` for as long
//! as it serves the tag tree. The bridge uses [`check_alive`] as the "connect"
//! step: the host counts as reachable only while its token is visible.

use std::sync::Arc;
use std::time::Duration;

use zenoh::Session;
use zenoh::liveliness::LivelinessToken;

use crate::error::{ProcessError, Result};

/// Holds the process liveliness token.
///
/// The token is declared on creation and undeclared by [`undeclare`](Self::undeclare)
/// or when the manager is dropped.
#[derive(Debug)]
pub struct LivelinessManager {
    key: String,
    token: LivelinessToken,
}

impl LivelinessManager {
    /// Declare the process as alive at `key`.
    pub async fn declare(session: &Arc<Session>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();

        let token = session
            .liveliness()
            .declare_token(&key)
            .await
            .map_err(|e| ProcessError::liveliness(&key, format!("declare failed: {}", e)))?;

        tracing::info!(key = %key, "Liveliness token declared");

        Ok(Self { key, token })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Withdraw the token so observers see the process leave immediately.
    pub async fn undeclare(self) -> Result<()> {
        self.token
            .undeclare()
            .await
            .map_err(|e| ProcessError::liveliness(&self.key, format!("undeclare failed: {}", e)))?;
        tracing::info!(key = %self.key, "Liveliness token undeclared");
        Ok(())
    }
}

/// Whether any liveliness token matching `key` is currently visible.
pub async fn check_alive(session: &Session, key: &str, timeout: Duration) -> Result<bool> {
    let replies = session
        .liveliness()
        .get(key)
        .timeout(timeout)
        .await
        .map_err(|e| ProcessError::liveliness(key, format!("query failed: {}", e)))?;

    let mut alive = false;
    while let Ok(reply) = replies.recv_async().await {
        if reply.result().is_ok() {
            alive = true;
        }
    }
    Ok(alive)
}
