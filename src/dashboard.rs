use serde::Serialize;

use crate::classify::{classify, ColumnRoles};
use crate::db::{DataSource, Loaded};
use crate::filter::{category_options, CategoryFilter};
use crate::metrics::{
    category_breakdown, customer_panel, key_metrics, select_tier, AnalysisTier,
    CategoryBreakdown, CustomerPanel, KeyMetrics,
};
use crate::models::RecordSet;
use crate::overview::{describe, DataOverview};

pub const NO_DATA_MESSAGE: &str =
    "No data returned from the database. Please check your table and permissions.";

/// Everything shown on the Analytics tab for the current filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub roles: ColumnRoles,
    pub category_options: Vec<String>,
    pub selected_categories: Vec<String>,
    pub filter_status: String,
    pub record_count: usize,
    pub key_metrics: KeyMetrics,
    pub tier: AnalysisTier,
    pub customer_panel: CustomerPanel,
    pub categories: Option<CategoryBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Page {
    NoData {
        message: String,
    },
    Loaded {
        overview: DataOverview,
        analytics: Analytics,
    },
}

/// Classifies the columns, applies the filter and computes both tabs.
pub fn build_page(records: &RecordSet, table: &str, filter: &CategoryFilter) -> Page {
    if records.is_empty() {
        return Page::NoData {
            message: NO_DATA_MESSAGE.to_string(),
        };
    }

    let roles = classify(records.columns());
    let view = filter.apply(records, &roles);
    let tier = select_tier(&roles);
    tracing::debug!(?tier, rows = view.records.len(), "dispatching analytics");

    let analytics = Analytics {
        category_options: category_options(records, &roles),
        selected_categories: filter.selected.clone(),
        filter_status: view.status,
        record_count: view.records.len(),
        key_metrics: key_metrics(&view.records, &roles),
        tier,
        customer_panel: customer_panel(tier, &view.records, &roles),
        categories: category_breakdown(&view.records, &roles),
        roles,
    };

    Page::Loaded {
        overview: describe(table, records),
        analytics,
    }
}

pub fn page_from_load(loaded: Loaded, table: &str, filter: &CategoryFilter) -> Page {
    match loaded.error {
        Some(message) => Page::NoData { message },
        None => build_page(&loaded.records, table, filter),
    }
}

/// One page render: load, classify, compute. Nothing is shared between calls.
pub async fn render_page(
    source: &DataSource,
    user_token: Option<&str>,
    filter: &CategoryFilter,
) -> Page {
    let loaded = source.load_or_empty(user_token).await;
    page_from_load(loaded, source.label(), filter)
}
