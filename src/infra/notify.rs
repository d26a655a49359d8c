//! Notification dispatch boundary.
//!
//! The crate guarantees the dispatcher is invoked with correct arguments;
//! delivery itself (SMTP, webhooks, chat) is an external collaborator behind
//! this trait. The default implementation records the dispatch in the log
//! stream so single-node deployments still have a full audit trail.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    OrderConfirmation,
    LowStockAlert,
    WeeklySummary,
    DailyReport,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::OrderConfirmation => "order_confirmation",
            TemplateKind::LowStockAlert => "low_stock_alert",
            TemplateKind::WeeklySummary => "weekly_summary",
            TemplateKind::DailyReport => "daily_report",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        template: TemplateKind,
        entity_id: Option<i64>,
        context: Value,
    ) -> Result<(), NotifyError>;
}

/// Dispatcher that emits the notification into the tracing stream.
#[derive(Default)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn dispatch(
        &self,
        template: TemplateKind,
        entity_id: Option<i64>,
        context: Value,
    ) -> Result<(), NotifyError> {
        info!(
            target = "infra::notify",
            template = template.as_str(),
            entity_id,
            context = %context,
            "notification dispatched"
        );
        Ok(())
    }
}
