//! HTTP surface: the two-tab dashboard page and its JSON form.

use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::charts::{self, ChartSpec};
use crate::config::USER_TOKEN_HEADER;
use crate::dashboard::{render_page, Page};
use crate::db::DataSource;
use crate::filter::CategoryFilter;
use crate::metrics::{Card, CustomerPanel};
use crate::models::{Metric, RecordSet};
use crate::overview::DataOverview;

#[derive(Clone)]
pub struct AppState {
    source: Arc<DataSource>,
}

impl AppState {
    pub fn new(source: DataSource) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    /// Comma-separated category selection.
    categories: Option<String>,
}

#[derive(Serialize)]
struct DashboardResponse {
    page: Page,
    charts: Vec<ChartSpec>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn serve(source: DataSource, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(AppState::new(source));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "dashboard listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn user_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
}

async fn load(state: &AppState, headers: &HeaderMap, params: &PageParams) -> Page {
    let filter = CategoryFilter::from_csv_param(params.categories.as_deref());
    render_page(&state.source, user_token(headers), &filter).await
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn dashboard_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> impl IntoResponse {
    let page = load(&state, &headers, &params).await;
    let charts = charts::plan(&page);
    Json(DashboardResponse { page, charts })
}

async fn page_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> impl IntoResponse {
    let page = load(&state, &headers, &params).await;
    Html(render_html(&page))
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const STYLE: &str = r#"
body { font-family: sans-serif; background: #232946; color: #F4F4F9; margin: 2rem; }
h1, h2, h3, h4 { color: #00B8A9; }
.tabs > input { display: none; }
.tabs > label { padding: .5rem 1rem; background: #393E46; border-radius: 8px 8px 0 0; cursor: pointer; font-weight: 600; }
.tabs > input:checked + label { background: #00B8A9; color: #232946; }
.tab { display: none; padding: 1rem 0; }
#tab-overview:checked ~ .overview, #tab-analytics:checked ~ .analytics { display: block; }
.cards { display: flex; gap: 1rem; flex-wrap: wrap; }
.card { background: #393E46; border-radius: 12px; padding: 1rem; min-width: 10rem; }
.card .value { font-size: 1.4rem; font-weight: 700; }
table { border-collapse: collapse; margin-bottom: 1rem; }
td, th { border: 1px solid #393E46; padding: .25rem .5rem; }
.chart { background: #fff; border-radius: 16px; display: inline-block; margin: .5rem; }
.notice { background: #393E46; padding: 1rem; border-radius: 8px; }
"#;

fn write_cards_html(out: &mut String, cards: &[Card]) {
    let _ = writeln!(out, "<div class=\"cards\">");
    for card in cards {
        let _ = writeln!(
            out,
            "<div class=\"card\"><div>{}</div><div class=\"value\">{}</div></div>",
            escape_html(&card.label),
            escape_html(&card.display_value())
        );
    }
    let _ = writeln!(out, "</div>");
}

fn write_table_html(out: &mut String, records: &RecordSet) {
    let _ = write!(out, "<table><tr>");
    for column in records.columns() {
        let _ = write!(out, "<th>{}</th>", escape_html(column));
    }
    let _ = writeln!(out, "</tr>");
    for row in records.rows() {
        let _ = write!(out, "<tr>");
        for value in row {
            let _ = write!(out, "<td>{}</td>", escape_html(&value.to_string()));
        }
        let _ = writeln!(out, "</tr>");
    }
    let _ = writeln!(out, "</table>");
}

fn write_overview_html(out: &mut String, overview: &DataOverview) {
    let _ = writeln!(out, "<h2>Data Source Overview</h2>");
    let _ = writeln!(
        out,
        "<p class=\"notice\"><b>Table</b>: <code>{}</code><br><b>Records Loaded</b>: {}<br><b>Columns</b>: {}</p>",
        escape_html(&overview.table),
        overview.record_count,
        overview.column_count
    );
    write_cards_html(out, &overview.cards());

    let _ = writeln!(out, "<h3>Column Information</h3>");
    let _ = writeln!(
        out,
        "<table><tr><th>Column</th><th>Data Type</th><th>Null Values</th><th>Unique Values</th></tr>"
    );
    for column in &overview.columns {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&column.name),
            column.dtype,
            column.null_count,
            column.unique_count
        );
    }
    let _ = writeln!(out, "</table>");

    let _ = writeln!(out, "<h3>First 10 Records</h3>");
    write_table_html(out, &overview.head);
    let _ = writeln!(out, "<h3>Last 10 Records</h3>");
    write_table_html(out, &overview.tail);
}

fn write_charts_html(out: &mut String, charts: &[ChartSpec]) {
    for chart in charts {
        match charts::render_svg(chart) {
            Ok(svg) => {
                let _ = writeln!(out, "<div class=\"chart\">{svg}</div>");
            }
            Err(err) => {
                warn!(chart = %chart.title, "skipping chart: {err:#}");
                let _ = writeln!(
                    out,
                    "<p class=\"notice\">{}: no data to chart.</p>",
                    escape_html(&chart.title)
                );
            }
        }
    }
}

pub fn render_html(page: &Page) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    let _ = writeln!(out, "<title>Customer Purchase Behavior Analytics</title>");
    let _ = writeln!(out, "<style>{STYLE}</style></head><body>");
    let _ = writeln!(out, "<h1>Customer Purchase Behavior Analytics</h1>");

    let (overview, analytics) = match page {
        Page::NoData { message } => {
            let _ = writeln!(out, "<p class=\"notice\">{}</p>", escape_html(message));
            let _ = writeln!(out, "</body></html>");
            return out;
        }
        Page::Loaded {
            overview,
            analytics,
        } => (overview, analytics),
    };

    let _ = writeln!(out, "<div class=\"tabs\">");
    let _ = writeln!(out, "<input type=\"radio\" name=\"tab\" id=\"tab-overview\" checked><label for=\"tab-overview\">Data Overview</label>");
    let _ = writeln!(out, "<input type=\"radio\" name=\"tab\" id=\"tab-analytics\"><label for=\"tab-analytics\">Analytics</label>");

    let _ = writeln!(out, "<section class=\"tab overview\">");
    write_overview_html(&mut out, overview);
    let _ = writeln!(out, "</section>");

    let _ = writeln!(out, "<section class=\"tab analytics\">");
    let _ = writeln!(out, "<h2>Analytics Dashboard</h2>");
    let _ = writeln!(out, "<form method=\"get\"><label>Categories (comma-separated): <input name=\"categories\" value=\"{}\"></label> <button>Apply</button></form>",
        escape_html(&analytics.selected_categories.join(",")));
    if !analytics.category_options.is_empty() {
        let _ = writeln!(
            out,
            "<p>Available: {}</p>",
            escape_html(&analytics.category_options.join(", "))
        );
    }
    let _ = writeln!(out, "<p class=\"notice\">{}</p>", escape_html(&analytics.filter_status));

    let _ = writeln!(out, "<h3>Key Metrics</h3>");
    write_cards_html(&mut out, &analytics.key_metrics.cards());

    let _ = writeln!(out, "<h3>Customer Analysis</h3>");
    match &analytics.customer_panel {
        CustomerPanel::Spend {
            analysis: Metric::Unavailable(reason),
        } => {
            let _ = writeln!(
                out,
                "<p class=\"notice\">Customer analysis unavailable: {}</p>",
                escape_html(reason)
            );
        }
        CustomerPanel::Records { note, sample } => {
            let _ = writeln!(out, "<p class=\"notice\">{}</p>", escape_html(note));
            write_table_html(&mut out, sample);
        }
        _ => {}
    }
    let insights = analytics.customer_panel.cards();
    if !insights.is_empty() {
        write_cards_html(&mut out, &insights);
    }

    let _ = writeln!(out, "<h3>Charts</h3>");
    write_charts_html(&mut out, &charts::plan(page));
    let _ = writeln!(out, "</section></div></body></html>");
    out
}
