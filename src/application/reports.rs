//! Report engine: stateless read-only aggregations.
//!
//! Reports bypass the entity cache entirely and are computed fresh on every
//! request. Only completed orders count toward sold/revenue figures; pending
//! and cancelled orders must never distort the totals.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::application::error::AppError;
use crate::application::repos::{CombinedRow, ProfitMarginRow, ReportsRepo, SalesByCategoryRow};
use crate::domain::types::ReportKind;

pub const DEFAULT_REPORT_LIMIT: u32 = 10;
pub const MAX_REPORT_LIMIT: u32 = 100;

/// Clamp a requested row limit into the supported range, bounding both the
/// result size and the query cost.
pub fn clamp_limit(limit: Option<u32>) -> i64 {
    i64::from(limit.unwrap_or(DEFAULT_REPORT_LIMIT).clamp(1, MAX_REPORT_LIMIT))
}

#[derive(Debug, Clone, Copy)]
pub struct ReportParams {
    pub kind: ReportKind,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    SalesByCategory(Vec<SalesByCategoryRow>),
    ProfitMargin(Vec<ProfitMarginRow>),
    Combined(Vec<CombinedRow>),
}

pub struct ReportService {
    repo: Arc<dyn ReportsRepo>,
}

impl ReportService {
    pub fn new(repo: Arc<dyn ReportsRepo>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self), fields(kind = ?params.kind))]
    pub async fn generate(&self, params: ReportParams) -> Result<Report, AppError> {
        let limit = clamp_limit(params.limit);

        let report = match params.kind {
            ReportKind::SalesByCategory => {
                Report::SalesByCategory(self.repo.sales_by_category(limit).await?)
            }
            ReportKind::ProfitMargin => {
                Report::ProfitMargin(self.repo.profit_margin(limit).await?)
            }
            ReportKind::Combined => Report::Combined(self.repo.combined(limit).await?),
        };

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::application::repos::RepoError;

    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(2)), 2);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), 100);
    }

    struct FixedReports;

    #[async_trait]
    impl ReportsRepo for FixedReports {
        async fn sales_by_category(
            &self,
            limit: i64,
        ) -> Result<Vec<SalesByCategoryRow>, RepoError> {
            // Pre-aggregated, already sorted by total_sold descending; the
            // repo honors the limit the same way the SQL LIMIT does.
            let rows = vec![
                SalesByCategoryRow {
                    category: "Books".to_string(),
                    total_sold: 30,
                    total_revenue: Decimal::new(60000, 2),
                },
                SalesByCategoryRow {
                    category: "Electronics".to_string(),
                    total_sold: 10,
                    total_revenue: Decimal::new(135000, 2),
                },
                SalesByCategoryRow {
                    category: "Garden".to_string(),
                    total_sold: 4,
                    total_revenue: Decimal::new(8000, 2),
                },
            ];
            Ok(rows.into_iter().take(limit as usize).collect())
        }

        async fn profit_margin(&self, _limit: i64) -> Result<Vec<ProfitMarginRow>, RepoError> {
            Ok(Vec::new())
        }

        async fn combined(&self, _limit: i64) -> Result<Vec<CombinedRow>, RepoError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn sales_report_orders_and_truncates() {
        let service = ReportService::new(std::sync::Arc::new(FixedReports));

        let report = service
            .generate(ReportParams {
                kind: ReportKind::SalesByCategory,
                limit: Some(2),
            })
            .await
            .expect("report");

        let Report::SalesByCategory(rows) = report else {
            panic!("wrong report shape");
        };
        // Highest summed quantity first, truncated to 2 even though 3
        // categories have sales.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, "Books");
        assert_eq!(rows[0].total_sold, 30);
        assert_eq!(rows[1].category, "Electronics");
    }
}
