use std::fmt::Write;

use crate::charts::{self, ChartData, ChartSpec};
use crate::classify::Role;
use crate::dashboard::{Analytics, Page};
use crate::metrics::{Card, CustomerPanel};
use crate::models::{Metric, RecordSet};
use crate::overview::DataOverview;

const CHART_POINTS: usize = 10;

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn write_cards(output: &mut String, cards: &[Card]) {
    for card in cards {
        let _ = writeln!(output, "- **{}**: {}", card.label, card.display_value());
    }
}

fn write_table(output: &mut String, records: &RecordSet) {
    if records.columns().is_empty() {
        let _ = writeln!(output, "_No records._");
        return;
    }

    let header: Vec<String> = records.columns().iter().map(|c| escape_cell(c)).collect();
    let _ = writeln!(output, "| {} |", header.join(" | "));
    let _ = writeln!(output, "|{}", " --- |".repeat(header.len()));
    for row in records.rows() {
        let cells: Vec<String> = row.iter().map(|v| escape_cell(&v.to_string())).collect();
        let _ = writeln!(output, "| {} |", cells.join(" | "));
    }
}

fn write_overview(output: &mut String, overview: &DataOverview) {
    let _ = writeln!(output, "## Data Overview");
    let _ = writeln!(output);
    let _ = writeln!(output, "### Data Source Details");
    let _ = writeln!(output, "- **Table**: `{}`", overview.table);
    let _ = writeln!(output, "- **Records Loaded**: {} records", overview.record_count);
    let _ = writeln!(output, "- **Columns**: {} fields", overview.column_count);
    let _ = writeln!(output);

    let _ = writeln!(output, "### Column Information");
    let _ = writeln!(output, "| Column | Data Type | Null Values | Unique Values |");
    let _ = writeln!(output, "| --- | --- | --- | --- |");
    for column in &overview.columns {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            escape_cell(&column.name),
            column.dtype,
            column.null_count,
            column.unique_count
        );
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "### Quick Stats");
    write_cards(output, &overview.cards());
    let _ = writeln!(output);

    let _ = writeln!(output, "### First 10 Records");
    write_table(output, &overview.head);
    let _ = writeln!(output);
    let _ = writeln!(output, "### Last 10 Records");
    write_table(output, &overview.tail);
    let _ = writeln!(output);
}

fn write_chart_summary(output: &mut String, chart: &ChartSpec) {
    let _ = writeln!(output, "#### {} ({})", chart.title, chart.kind());
    if chart.is_empty() {
        let _ = writeln!(output, "_No data to chart._");
        return;
    }

    match &chart.data {
        ChartData::Pie { slices } => {
            let total: f64 = slices.iter().map(|s| s.value).sum();
            for slice in slices.iter().take(CHART_POINTS) {
                let share = if total > 0.0 { slice.value / total * 100.0 } else { 0.0 };
                let _ = writeln!(output, "- {}: {} ({share:.1}%)", slice.label, slice.value);
            }
        }
        ChartData::Bar { bars, value_label, .. } => {
            for bar in bars.iter().take(CHART_POINTS) {
                let _ = writeln!(output, "- {}: {:.2} {}", bar.label, bar.value, value_label);
            }
        }
        ChartData::Scatter { points, .. } => {
            let _ = writeln!(output, "{} customers plotted by purchases vs. total spent.", points.len());
        }
        ChartData::Histogram { bins, .. } => {
            for bin in bins.iter().filter(|b| b.count > 0) {
                let _ = writeln!(output, "- {:.1} to {:.1}: {}", bin.start, bin.end, bin.count);
            }
        }
    }
}

fn write_analytics(output: &mut String, analytics: &Analytics, charts: &[ChartSpec]) {
    let _ = writeln!(output, "## Analytics");
    let _ = writeln!(output);

    let _ = writeln!(output, "### Column Roles");
    for (role, column) in analytics.roles.assignments() {
        let _ = writeln!(output, "- {role}: {}", column.unwrap_or("none"));
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "### Filter by Category");
    let _ = writeln!(output, "{}", analytics.filter_status);
    if !analytics.category_options.is_empty() {
        let _ = writeln!(output, "Available: {}", analytics.category_options.join(", "));
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "### Key Metrics");
    write_cards(output, &analytics.key_metrics.cards());
    let _ = writeln!(output);

    let _ = writeln!(output, "### Customer Analysis");
    match &analytics.customer_panel {
        CustomerPanel::Spend {
            analysis: Metric::Unavailable(reason),
        } => {
            let _ = writeln!(output, "Customer analysis unavailable: {reason}");
        }
        CustomerPanel::Geography { .. } => {
            let _ = writeln!(output, "Geographic distribution of records.");
        }
        CustomerPanel::Records { note, sample } => {
            let _ = writeln!(output, "{note}");
            let _ = writeln!(output);
            write_table(output, sample);
        }
        _ => {}
    }
    let insights = analytics.customer_panel.cards();
    if !insights.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "#### Insights");
        write_cards(output, &insights);
    }
    let _ = writeln!(output);

    if analytics.categories.is_none() {
        let _ = writeln!(output, "### Category Distribution");
        let _ = writeln!(output, "Category columns not detected for distribution analysis.");
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "### Charts");
    if charts.is_empty() {
        let _ = writeln!(output, "No charts for this selection.");
    }
    for chart in charts {
        write_chart_summary(output, chart);
        let _ = writeln!(output);
    }
}

pub fn build_report(page: &Page) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Customer Purchase Behavior Analytics");
    let _ = writeln!(output);

    match page {
        Page::NoData { message } => {
            let _ = writeln!(output, "{message}");
        }
        Page::Loaded {
            overview,
            analytics,
        } => {
            let charts = charts::plan(page);
            write_overview(&mut output, overview);
            write_analytics(&mut output, analytics, &charts);
        }
    }

    output
}

/// One-screen summary for the terminal.
pub fn build_summary(page: &Page) -> String {
    let mut output = String::new();
    match page {
        Page::NoData { message } => {
            let _ = writeln!(output, "{message}");
        }
        Page::Loaded {
            overview,
            analytics,
        } => {
            let _ = writeln!(
                output,
                "{}: {} records, {} columns ({} after filter)",
                overview.table, overview.record_count, overview.column_count, analytics.record_count
            );
            let _ = writeln!(output, "{}", analytics.filter_status);
            for card in analytics.key_metrics.cards() {
                let _ = writeln!(output, "- {}: {}", card.label, card.display_value());
            }
            let _ = writeln!(output, "Analysis tier: {:?}", analytics.tier);
            for card in analytics.customer_panel.cards() {
                let _ = writeln!(output, "- {}: {}", card.label, card.display_value());
            }
            if let Some(column) = analytics.roles.primary(Role::Category) {
                let _ = writeln!(output, "Categories ({column}): {}", analytics.category_options.len());
            }
        }
    }
    output
}
