//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Queue lanes consumed by the worker pool.
///
/// Lane assignment is a fixed, static partition per job type so slow,
/// high-volume work (reports) cannot starve order processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Default,
    Emails,
    Reports,
    Orders,
    Monitoring,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Default => "default",
            Lane::Emails => "emails",
            Lane::Reports => "reports",
            Lane::Orders => "orders",
            Lane::Monitoring => "monitoring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ProcessOrder,
    SendOrderConfirmation,
    SendLowStockAlert,
    GenerateDailyReport,
    CleanupExpiredOrders,
    LowStockSweep,
    UpdatePopularity,
    BulkUpdatePrices,
    WeeklySummary,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ProcessOrder => "process_order",
            JobType::SendOrderConfirmation => "send_order_confirmation",
            JobType::SendLowStockAlert => "send_low_stock_alert",
            JobType::GenerateDailyReport => "generate_daily_report",
            JobType::CleanupExpiredOrders => "cleanup_expired_orders",
            JobType::LowStockSweep => "low_stock_sweep",
            JobType::UpdatePopularity => "update_popularity",
            JobType::BulkUpdatePrices => "bulk_update_prices",
            JobType::WeeklySummary => "weekly_summary",
        }
    }

    /// Static lane partition per job type.
    pub fn lane(self) -> Lane {
        match self {
            JobType::ProcessOrder => Lane::Orders,
            JobType::SendOrderConfirmation => Lane::Emails,
            JobType::SendLowStockAlert => Lane::Monitoring,
            JobType::GenerateDailyReport | JobType::WeeklySummary => Lane::Reports,
            JobType::CleanupExpiredOrders
            | JobType::LowStockSweep
            | JobType::UpdatePopularity
            | JobType::BulkUpdatePrices => Lane::Default,
        }
    }

    pub const ALL: [JobType; 9] = [
        JobType::ProcessOrder,
        JobType::SendOrderConfirmation,
        JobType::SendLowStockAlert,
        JobType::GenerateDailyReport,
        JobType::CleanupExpiredOrders,
        JobType::LowStockSweep,
        JobType::UpdatePopularity,
        JobType::BulkUpdatePrices,
        JobType::WeeklySummary,
    ];
}

impl TryFrom<&str> for JobType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "process_order" => Ok(JobType::ProcessOrder),
            "send_order_confirmation" => Ok(JobType::SendOrderConfirmation),
            "send_low_stock_alert" => Ok(JobType::SendLowStockAlert),
            "generate_daily_report" => Ok(JobType::GenerateDailyReport),
            "cleanup_expired_orders" => Ok(JobType::CleanupExpiredOrders),
            "low_stock_sweep" => Ok(JobType::LowStockSweep),
            "update_popularity" => Ok(JobType::UpdatePopularity),
            "bulk_update_prices" => Ok(JobType::BulkUpdatePrices),
            "weekly_summary" => Ok(JobType::WeeklySummary),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Scheduled,
    Running,
    Done,
    Failed,
    Killed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Scheduled => "Scheduled",
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Failed => "Failed",
            JobState::Killed => "Killed",
        }
    }
}

impl TryFrom<&str> for JobState {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Pending" | "Latest" => Ok(JobState::Pending),
            "Scheduled" => Ok(JobState::Scheduled),
            "Running" => Ok(JobState::Running),
            "Done" => Ok(JobState::Done),
            "Failed" => Ok(JobState::Failed),
            "Killed" => Ok(JobState::Killed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    SalesByCategory,
    ProfitMargin,
    Combined,
}

impl TryFrom<&str> for ReportKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sales_by_category" => Ok(ReportKind::SalesByCategory),
            "profit_margin" => Ok(ReportKind::ProfitMargin),
            "combined" => Ok(ReportKind::Combined),
            _ => Err(()),
        }
    }
}
