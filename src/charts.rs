//! Chart plans derived from the dashboard page, and their SVG rendering.

use anyhow::bail;
use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;
use serde::Serialize;

use crate::dashboard::Page;
use crate::metrics::{CustomerPanel, HistogramBin};
use crate::models::{Metric, ValueCount};

const WIDTH: u32 = 720;
const HEIGHT: u32 = 480;

const PALETTE: [RGBColor; 10] = [
    RGBColor(141, 211, 199),
    RGBColor(255, 237, 111),
    RGBColor(190, 186, 218),
    RGBColor(251, 128, 114),
    RGBColor(128, 177, 211),
    RGBColor(253, 180, 98),
    RGBColor(179, 222, 105),
    RGBColor(252, 205, 229),
    RGBColor(188, 128, 189),
    RGBColor(0, 184, 169),
];

fn palette(idx: usize) -> RGBColor {
    PALETTE[idx % PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: f64,
}

impl From<&ValueCount> for LabeledValue {
    fn from(count: &ValueCount) -> Self {
        Self {
            label: count.value.clone(),
            value: count.count as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub label: String,
    pub group: String,
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartData {
    Pie {
        slices: Vec<LabeledValue>,
    },
    Bar {
        bars: Vec<LabeledValue>,
        horizontal: bool,
        category_label: String,
        value_label: String,
    },
    Scatter {
        points: Vec<ScatterPoint>,
        x_label: String,
        y_label: String,
    },
    Histogram {
        bins: Vec<HistogramBin>,
        x_label: String,
        y_label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub data: ChartData,
}

impl ChartSpec {
    pub fn kind(&self) -> &'static str {
        match self.data {
            ChartData::Pie { .. } => "pie",
            ChartData::Bar { .. } => "bar",
            ChartData::Scatter { .. } => "scatter",
            ChartData::Histogram { .. } => "histogram",
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.data {
            ChartData::Pie { slices } => slices.iter().all(|s| s.value <= 0.0),
            ChartData::Bar { bars, .. } => bars.is_empty(),
            ChartData::Scatter { points, .. } => points.is_empty(),
            ChartData::Histogram { bins, .. } => bins.iter().all(|b| b.count == 0),
        }
    }

    /// File name for the rendered chart, e.g. `top-10-purchase-categories.svg`.
    pub fn file_name(&self) -> String {
        let mut slug = String::new();
        for ch in self.title.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        format!("{}.svg", slug.trim_matches('-'))
    }
}

fn pie(title: &str, counts: &[ValueCount]) -> ChartSpec {
    ChartSpec {
        title: title.to_string(),
        data: ChartData::Pie {
            slices: counts.iter().map(LabeledValue::from).collect(),
        },
    }
}

fn bar(title: &str, counts: &[ValueCount], category_label: &str, value_label: &str) -> ChartSpec {
    ChartSpec {
        title: title.to_string(),
        data: ChartData::Bar {
            bars: counts.iter().map(LabeledValue::from).collect(),
            horizontal: true,
            category_label: category_label.to_string(),
            value_label: value_label.to_string(),
        },
    }
}

/// The charts a page produces. A page without data produces none.
pub fn plan(page: &Page) -> Vec<ChartSpec> {
    let Page::Loaded { analytics, .. } = page else {
        return Vec::new();
    };

    let mut charts = Vec::new();

    match &analytics.customer_panel {
        CustomerPanel::Spend {
            analysis: Metric::Available(spend),
        } => {
            charts.push(ChartSpec {
                title: "Customer Value Segments".to_string(),
                data: ChartData::Pie {
                    slices: spend
                        .segment_counts
                        .iter()
                        .map(|(segment, count)| LabeledValue {
                            label: segment.label().to_string(),
                            value: *count as f64,
                        })
                        .collect(),
                },
            });
            charts.push(ChartSpec {
                title: "Top 10 Customers by Total Spent".to_string(),
                data: ChartData::Bar {
                    bars: spend
                        .top_customers
                        .iter()
                        .map(|c| LabeledValue {
                            label: c.customer.clone(),
                            value: c.total_spent,
                        })
                        .collect(),
                    horizontal: false,
                    category_label: spend.customer_column.clone(),
                    value_label: "Total Amount ($)".to_string(),
                },
            });
            charts.push(ChartSpec {
                title: "Customer Purchase Behavior Analysis".to_string(),
                data: ChartData::Scatter {
                    points: spend
                        .customers
                        .iter()
                        .map(|c| ScatterPoint {
                            label: c.customer.clone(),
                            group: c.segment.label().to_string(),
                            x: c.purchase_count as f64,
                            y: c.total_spent,
                            size: c.avg_purchase,
                        })
                        .collect(),
                    x_label: "Number of Purchases".to_string(),
                    y_label: "Total Amount Spent ($)".to_string(),
                },
            });
        }
        CustomerPanel::Spend { .. } => {}
        CustomerPanel::Frequency { analysis } => {
            charts.push(bar(
                "Top 15 Customers by Purchase Frequency",
                &analysis.top,
                "Customer ID",
                "Number of Purchases",
            ));
            charts.push(ChartSpec {
                title: "Customer Purchase Frequency Distribution".to_string(),
                data: ChartData::Histogram {
                    bins: analysis.distribution.clone(),
                    x_label: "Number of Purchases".to_string(),
                    y_label: "Number of Customers".to_string(),
                },
            });
        }
        CustomerPanel::Geography { analysis } => {
            if let Some((label, leading)) = analysis.leading() {
                let singular = if label == "States" { "State" } else { "City" };
                charts.push(bar(
                    &format!("Top 15 {label} by Customer Count"),
                    &leading,
                    singular,
                    "Number of Customers",
                ));
            }
            if let Some((label, slices)) = analysis.distribution() {
                let title = if label == "Country" {
                    "Customer Distribution by Country"
                } else {
                    "Top 10 States - Customer Distribution"
                };
                charts.push(pie(title, &slices));
            }
        }
        CustomerPanel::Records { .. } => {}
    }

    if let Some(categories) = &analytics.categories {
        charts.push(pie("Purchase Distribution by Category", &categories.counts));
        charts.push(bar(
            "Top 10 Purchase Categories",
            &categories.top,
            "Category",
            "Count",
        ));
    }

    charts
}

/// Renders one chart to an SVG document.
pub fn render_svg(spec: &ChartSpec) -> anyhow::Result<String> {
    if spec.is_empty() {
        bail!("chart {:?} has no data to draw", spec.title);
    }

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        match &spec.data {
            ChartData::Pie { slices } => draw_pie(&root, &spec.title, slices)?,
            ChartData::Bar {
                bars,
                horizontal: true,
                category_label,
                value_label,
            } => draw_horizontal_bars(&root, &spec.title, bars, category_label, value_label)?,
            ChartData::Bar {
                bars,
                category_label,
                value_label,
                ..
            } => draw_vertical_bars(&root, &spec.title, bars, category_label, value_label)?,
            ChartData::Scatter {
                points,
                x_label,
                y_label,
            } => draw_scatter(&root, &spec.title, points, x_label, y_label)?,
            ChartData::Histogram {
                bins,
                x_label,
                y_label,
            } => draw_histogram(&root, &spec.title, bins, x_label, y_label)?,
        }

        root.present()?;
    }
    Ok(svg)
}

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

fn draw_pie(root: &Area<'_>, title: &str, slices: &[LabeledValue]) -> anyhow::Result<()> {
    let area = root.titled(title, ("sans-serif", 22))?;
    let (width, height) = area.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = f64::from(width.min(height)) * 0.35;

    let slices: Vec<&LabeledValue> = slices.iter().filter(|s| s.value > 0.0).collect();
    let sizes: Vec<f64> = slices.iter().map(|s| s.value).collect();
    let colors: Vec<RGBColor> = (0..slices.len()).map(palette).collect();
    let labels: Vec<String> = slices.iter().map(|s| s.label.clone()).collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(("sans-serif", 14).into_font().color(&BLACK));
    area.draw(&pie)?;
    Ok(())
}

fn axis_max(max: f64) -> f64 {
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

fn draw_vertical_bars(
    root: &Area<'_>,
    title: &str,
    bars: &[LabeledValue],
    category_label: &str,
    value_label: &str,
) -> anyhow::Result<()> {
    let n = bars.len() as u32;
    let max = bars.iter().map(|b| b.value).fold(0.0, f64::max);
    let labels: Vec<&str> = bars.iter().map(|b| b.label.as_str()).collect();

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d((0u32..n).into_segmented(), 0f64..axis_max(max))?;

    let label_of = |v: &SegmentValue<u32>| match v {
        SegmentValue::CenterOf(idx) => labels.get(*idx as usize).map(|l| l.to_string()).unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len())
        .x_label_formatter(&label_of)
        .x_desc(category_label)
        .y_desc(value_label)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(idx, bar)| {
        let idx = idx as u32;
        let mut rect = Rectangle::new(
            [
                (SegmentValue::Exact(idx), 0.0),
                (SegmentValue::Exact(idx + 1), bar.value),
            ],
            palette(9).filled(),
        );
        rect.set_margin(0, 0, 6, 6);
        rect
    }))?;

    Ok(())
}

fn draw_horizontal_bars(
    root: &Area<'_>,
    title: &str,
    bars: &[LabeledValue],
    category_label: &str,
    value_label: &str,
) -> anyhow::Result<()> {
    let n = bars.len() as u32;
    let max = bars.iter().map(|b| b.value).fold(0.0, f64::max);
    // The first bar is drawn at the top.
    let position = |idx: usize| n - 1 - idx as u32;
    let label_at = |pos: u32| {
        let idx = (n - 1).checked_sub(pos)? as usize;
        bars.get(idx).map(|b| b.label.clone())
    };

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(120)
        .build_cartesian_2d(0f64..axis_max(max), (0u32..n).into_segmented())?;

    let y_label = |v: &SegmentValue<u32>| match v {
        SegmentValue::CenterOf(pos) => label_at(*pos).unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(bars.len())
        .y_label_formatter(&y_label)
        .x_desc(value_label)
        .y_desc(category_label)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(idx, bar)| {
        let pos = position(idx);
        let mut rect = Rectangle::new(
            [
                (0.0, SegmentValue::Exact(pos)),
                (bar.value, SegmentValue::Exact(pos + 1)),
            ],
            palette(idx).filled(),
        );
        rect.set_margin(4, 4, 0, 0);
        rect
    }))?;

    Ok(())
}

fn padded_range(values: impl Iterator<Item = f64> + Clone) -> std::ops::Range<f64> {
    let min = values.clone().fold(f64::MAX, f64::min);
    let max = values.fold(f64::MIN, f64::max);
    if max > min {
        let pad = (max - min) * 0.05;
        (min - pad)..(max + pad)
    } else {
        (min - 1.0)..(max + 1.0)
    }
}

fn draw_scatter(
    root: &Area<'_>,
    title: &str,
    points: &[ScatterPoint],
    x_label: &str,
    y_label: &str,
) -> anyhow::Result<()> {
    let x_range = padded_range(points.iter().map(|p| p.x));
    let y_range = padded_range(points.iter().map(|p| p.y));
    let max_size = points.iter().map(|p| p.size).fold(0.0, f64::max);

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()?;

    let mut groups: Vec<&str> = Vec::new();
    for point in points {
        if !groups.contains(&point.group.as_str()) {
            groups.push(&point.group);
        }
    }

    for (idx, group) in groups.iter().enumerate() {
        let color = palette(idx);
        chart
            .draw_series(points.iter().filter(|p| p.group == *group).map(|p| {
                let radius = if max_size > 0.0 {
                    3 + (p.size / max_size * 12.0) as i32
                } else {
                    4
                };
                Circle::new((p.x, p.y), radius, color.mix(0.7).filled())
            }))?
            .label(*group)
            .legend(move |(x, y)| Circle::new((x + 8, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

fn draw_histogram(
    root: &Area<'_>,
    title: &str,
    bins: &[HistogramBin],
    x_label: &str,
    y_label: &str,
) -> anyhow::Result<()> {
    let start = bins.first().map(|b| b.start).unwrap_or(0.0);
    let end = bins.last().map(|b| b.end).unwrap_or(1.0);
    let max = bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(start..end, 0f64..axis_max(max))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()?;

    chart.draw_series(bins.iter().map(|bin| {
        Rectangle::new(
            [(bin.start, 0.0), (bin.end, bin.count as f64)],
            palette(4).filled(),
        )
    }))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::build_page;
    use crate::filter::CategoryFilter;
    use crate::models::{RecordSet, Value};

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn page(columns: &[&str], rows: Vec<Vec<Value>>) -> Page {
        let records = RecordSet::new(columns.iter().map(|c| c.to_string()).collect(), rows);
        build_page(&records, "t", &CategoryFilter::default())
    }

    fn titles(charts: &[ChartSpec]) -> Vec<&str> {
        charts.iter().map(|c| c.title.as_str()).collect()
    }

    #[test]
    fn no_data_page_has_no_charts() {
        let page = Page::NoData {
            message: "nothing".to_string(),
        };
        assert!(plan(&page).is_empty());
    }

    #[test]
    fn spend_tier_plans_segment_top_and_scatter_charts() {
        let page = page(
            &["customer_id", "category", "amount"],
            vec![
                vec![Value::Int(1), text("A"), Value::Int(10)],
                vec![Value::Int(1), text("B"), Value::Int(20)],
                vec![Value::Int(2), text("A"), Value::Int(5)],
            ],
        );
        let charts = plan(&page);
        assert_eq!(
            titles(&charts),
            vec![
                "Customer Value Segments",
                "Top 10 Customers by Total Spent",
                "Customer Purchase Behavior Analysis",
                "Purchase Distribution by Category",
                "Top 10 Purchase Categories",
            ]
        );
        assert_eq!(charts[2].kind(), "scatter");
    }

    #[test]
    fn frequency_tier_plans_bar_and_histogram() {
        let page = page(
            &["user"],
            vec![vec![text("a")], vec![text("a")], vec![text("b")]],
        );
        let charts = plan(&page);
        assert_eq!(
            titles(&charts),
            vec![
                "Top 15 Customers by Purchase Frequency",
                "Customer Purchase Frequency Distribution",
            ]
        );
        assert_eq!(charts[1].kind(), "histogram");
    }

    #[test]
    fn geography_tier_without_country_uses_state_pie() {
        let page = page(
            &["state", "amount"],
            vec![vec![text("TX"), Value::Int(1)], vec![text("NV"), Value::Int(2)]],
        );
        assert_eq!(
            titles(&plan(&page)),
            vec![
                "Top 15 States by Customer Count",
                "Top 10 States - Customer Distribution",
            ]
        );
    }

    #[test]
    fn geography_tier_with_city_and_country_plans_city_bar_and_country_pie() {
        let page = page(
            &["city", "country"],
            vec![
                vec![text("Lyon"), text("FR")],
                vec![text("Lyon"), text("FR")],
                vec![text("Porto"), text("PT")],
            ],
        );
        let charts = plan(&page);
        assert_eq!(
            titles(&charts),
            vec![
                "Top 15 Cities by Customer Count",
                "Customer Distribution by Country",
            ]
        );
        assert_eq!(charts[0].kind(), "bar");
        assert_eq!(charts[1].kind(), "pie");
    }

    #[test]
    fn country_only_geography_plans_just_the_country_pie() {
        let page = page(&["country"], vec![vec![text("FR")], vec![text("PT")]]);
        assert_eq!(titles(&plan(&page)), vec!["Customer Distribution by Country"]);
    }

    #[test]
    fn renders_every_chart_kind_to_svg() {
        let page = page(
            &["customer_id", "category", "amount"],
            vec![
                vec![Value::Int(1), text("A"), Value::Int(10)],
                vec![Value::Int(1), text("B"), Value::Int(20)],
                vec![Value::Int(2), text("A"), Value::Int(5)],
                vec![Value::Int(3), text("C"), Value::Int(40)],
            ],
        );
        let mut charts = plan(&page);
        charts.push(ChartSpec {
            title: "Customer Purchase Frequency Distribution".to_string(),
            data: ChartData::Histogram {
                bins: crate::metrics::histogram(&[1.0, 2.0, 2.0, 5.0], 4),
                x_label: "Number of Purchases".to_string(),
                y_label: "Number of Customers".to_string(),
            },
        });

        for chart in &charts {
            let svg = render_svg(chart).unwrap();
            assert!(svg.contains("<svg"), "{}", chart.title);
        }
    }

    #[test]
    fn empty_chart_is_not_rendered() {
        let chart = bar("Top 10 Purchase Categories", &[], "Category", "Count");
        assert!(chart.is_empty());
        assert!(render_svg(&chart).is_err());
    }

    #[test]
    fn file_names_are_slugs() {
        let chart = pie("Top 10 States - Customer Distribution", &[]);
        assert_eq!(chart.file_name(), "top-10-states-customer-distribution.svg");
    }
}
