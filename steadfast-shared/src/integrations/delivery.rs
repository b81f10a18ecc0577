/// Notification delivery
///
/// A [`DeliveryProvider`] pushes one notification to its resolved audience and
/// reports how many recipients were reached. [`SimulatedDelivery`] reports a
/// random 90–100% of the audience as delivered and the rest as failed.

use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use crate::models::notification::NotificationChannel;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery provider rejected the notification: {0}")]
    Rejected(String),

    #[error("Delivery provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub notification_id: Uuid,
    pub channel: NotificationChannel,
    pub title: String,
    pub body: String,

    /// Number of users the audience resolved to
    pub audience_size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: i64,
    pub failed: i64,
}

#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReport, DeliveryError>;
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedDelivery;

impl SimulatedDelivery {
    pub fn new() -> Self {
        SimulatedDelivery
    }
}

/// Splits an audience given a delivery ratio in `[0, 1]`
fn split(audience: i64, ratio: f64) -> DeliveryReport {
    let audience = audience.max(0);
    let delivered = ((audience as f64) * ratio.clamp(0.0, 1.0)).floor() as i64;
    DeliveryReport {
        delivered,
        failed: audience - delivered,
    }
}

#[async_trait]
impl DeliveryProvider for SimulatedDelivery {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReport, DeliveryError> {
        let ratio = rand::thread_rng().gen_range(0.90..=1.0);
        let report = split(request.audience_size, ratio);

        tracing::info!(
            notification_id = %request.notification_id,
            channel = %request.channel,
            audience = request.audience_size,
            delivered = report.delivered,
            failed = report.failed,
            "Simulated notification delivery"
        );

        Ok(report)
    }
}
