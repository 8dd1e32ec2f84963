//! Transport channel trait

use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// Request/response byte channel to the vehicle.
///
/// One channel serves every ECU of a session; requests carry the target
/// ECU's stable identifier and the implementation handles physical
/// addressing. Implementations must be safe to share across tasks.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Send one request to an ECU and wait for its response.
    async fn send(
        &self,
        ecu_id: &str,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Whether the link is currently usable.
    async fn is_connected(&self) -> bool;

    /// Release link resources. Later sends fail with
    /// [`TransportError::Disconnected`].
    async fn close(&self);
}
