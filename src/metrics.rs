use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::classify::{ColumnRoles, Role};
use crate::models::{CustomerAggregate, Metric, RecordSet, ValueCount, ValueSegment};

const TOP_CUSTOMERS: usize = 10;
const TOP_FREQUENT_CUSTOMERS: usize = 15;
const TOP_GEO_VALUES: usize = 15;
const TOP_STATE_SLICES: usize = 10;
const TOP_CATEGORIES: usize = 10;
const FREQUENCY_BINS: usize = 20;

/// Value shown on a metric card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CardValue {
    Count(usize),
    Money(f64),
    Ratio(f64),
    Percent(f64),
    Megabytes(f64),
    Text(String),
}

impl fmt::Display for CardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardValue::Count(n) => f.write_str(&group_thousands(&n.to_string())),
            CardValue::Money(v) => {
                let formatted = format!("{:.2}", v.abs());
                let (whole, cents) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
                let sign = if *v < 0.0 { "-" } else { "" };
                write!(f, "{sign}${}.{cents}", group_thousands(whole))
            }
            CardValue::Ratio(v) => write!(f, "{v:.1}"),
            CardValue::Percent(v) => write!(f, "{v:.1}%"),
            CardValue::Megabytes(v) => write!(f, "{v:.2} MB"),
            CardValue::Text(text) => f.write_str(text),
        }
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub label: String,
    pub value: Metric<CardValue>,
}

impl Card {
    fn new(label: &str, value: Metric<CardValue>) -> Self {
        Self {
            label: label.to_string(),
            value,
        }
    }

    fn available(label: &str, value: CardValue) -> Self {
        Self::new(label, Metric::Available(value))
    }

    pub fn display_value(&self) -> String {
        self.value.display_with(|value| value.to_string())
    }
}

/// Numeric values of a column with nulls dropped. Any non-numeric cell fails the column.
pub fn numeric_values(records: &RecordSet, column: &str) -> Result<Vec<f64>, String> {
    let mut values = Vec::new();
    for value in records.column_values(column) {
        if value.is_null() {
            continue;
        }
        match value.as_f64() {
            Some(number) => values.push(number),
            None => {
                return Err(format!(
                    "column {column} holds non-numeric {} values",
                    value.type_name()
                ))
            }
        }
    }
    Ok(values)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountSummary {
    pub mean: Metric<f64>,
    pub sum: Metric<f64>,
    pub max: Metric<f64>,
    pub min: Metric<f64>,
}

impl AmountSummary {
    fn unavailable(reason: &str) -> Self {
        Self {
            mean: Metric::unavailable(reason),
            sum: Metric::unavailable(reason),
            max: Metric::unavailable(reason),
            min: Metric::unavailable(reason),
        }
    }
}

/// Mean, sum, max and min of the amount column.
///
/// The sum of no values is zero; the other three need at least one value.
pub fn amount_summary(records: &RecordSet, roles: &ColumnRoles) -> AmountSummary {
    let Some(column) = roles.primary(Role::Amount) else {
        return AmountSummary::unavailable("no amount column");
    };

    let values = match numeric_values(records, column) {
        Ok(values) => values,
        Err(reason) => return AmountSummary::unavailable(&reason),
    };

    if values.is_empty() {
        let reason = format!("no values in {column}");
        return AmountSummary {
            sum: Metric::Available(0.0),
            ..AmountSummary::unavailable(&reason)
        };
    }

    let sum: f64 = values.iter().sum();
    AmountSummary {
        mean: Metric::Available(sum / values.len() as f64),
        sum: Metric::Available(sum),
        max: Metric::Available(values.iter().copied().fold(f64::MIN, f64::max)),
        min: Metric::Available(values.iter().copied().fold(f64::MAX, f64::min)),
    }
}

/// The four headline cards of the analytics tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetrics {
    pub amount_column: Option<String>,
    pub amount: AmountSummary,
    pub total_records: usize,
    pub unique_categories: usize,
    pub date_columns: usize,
    pub columns: usize,
}

pub fn key_metrics(records: &RecordSet, roles: &ColumnRoles) -> KeyMetrics {
    let unique_categories = match roles.primary(Role::Category) {
        Some(column) => value_counts(records, column).len(),
        None => 0,
    };

    KeyMetrics {
        amount_column: roles.primary(Role::Amount).map(str::to_string),
        amount: amount_summary(records, roles),
        total_records: records.len(),
        unique_categories,
        date_columns: roles.candidates(Role::Date).len(),
        columns: records.columns().len(),
    }
}

impl KeyMetrics {
    pub fn cards(&self) -> Vec<Card> {
        if self.amount_column.is_some() {
            let money = |metric: &Metric<f64>| metric.clone().map(CardValue::Money);
            return vec![
                Card::new("Average Purchase", money(&self.amount.mean)),
                Card::new("Total Revenue", money(&self.amount.sum)),
                Card::new("Max Purchase", money(&self.amount.max)),
                Card::new("Min Purchase", money(&self.amount.min)),
            ];
        }

        vec![
            Card::available("Total Records", CardValue::Count(self.total_records)),
            Card::available("Unique Categories", CardValue::Count(self.unique_categories)),
            Card::new(
                "Date Range",
                match self.date_columns {
                    0 => Metric::unavailable("no date columns"),
                    n => Metric::Available(CardValue::Count(n)),
                },
            ),
            Card::available("Columns", CardValue::Count(self.columns)),
        ]
    }
}

/// Which customer-analysis panel the dashboard produces. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTier {
    CustomerSpend,
    CustomerFrequency,
    Geography,
    Category,
    None,
}

pub fn select_tier(roles: &ColumnRoles) -> AnalysisTier {
    let customer = roles.has(Role::Customer);
    let amount = roles.has(Role::Amount);

    if customer && amount {
        AnalysisTier::CustomerSpend
    } else if customer {
        AnalysisTier::CustomerFrequency
    } else if roles.has_geography() {
        AnalysisTier::Geography
    } else if roles.has(Role::Category) {
        AnalysisTier::Category
    } else {
        AnalysisTier::None
    }
}

/// Non-null value counts, most frequent first; ties keep first-seen order.
pub fn value_counts(records: &RecordSet, column: &str) -> Vec<ValueCount> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<ValueCount> = Vec::new();

    for value in records.column_values(column) {
        let Some(key) = value.key() else {
            continue;
        };
        match positions.get(&key) {
            Some(&idx) => counts[idx].count += 1,
            None => {
                positions.insert(key.clone(), counts.len());
                counts.push(ValueCount {
                    value: key,
                    count: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Equal-width bin edges over `[min, max]`, following pandas `cut(bins=3)`.
///
/// The lowest edge is pushed down by 0.1% of the range so the minimum falls
/// inside the first right-closed bin. A zero-width range is widened by 0.1%
/// of its magnitude on both sides.
pub fn segment_edges(min: f64, max: f64) -> [f64; 4] {
    let (low, high) = if max > min {
        (min, max)
    } else if min == 0.0 {
        (-0.001, 0.001)
    } else {
        (min - 0.001 * min.abs(), max + 0.001 * max.abs())
    };

    let step = (high - low) / 3.0;
    let mut edges = [low, low + step, low + 2.0 * step, high];
    if max > min {
        edges[0] -= 0.001 * (max - min);
    }
    edges
}

/// Segment label for each total, in input order.
pub fn segment_customers(totals: &[f64]) -> Vec<ValueSegment> {
    if totals.is_empty() {
        return Vec::new();
    }

    let min = totals.iter().copied().fold(f64::MAX, f64::min);
    let max = totals.iter().copied().fold(f64::MIN, f64::max);
    let edges = segment_edges(min, max);

    totals
        .iter()
        .map(|&total| {
            if total <= edges[1] {
                ValueSegment::Low
            } else if total <= edges[2] {
                ValueSegment::Medium
            } else {
                ValueSegment::High
            }
        })
        .collect()
}

/// Per-customer sum, mean and purchase count of the amount column.
///
/// Rows with a null customer are skipped. `purchase_count` counts rows; the
/// mean is taken over non-null amounts only. Customers keep first-seen order.
pub fn customer_aggregates(
    records: &RecordSet,
    customer_column: &str,
    amount_column: &str,
) -> Result<Vec<CustomerAggregate>, String> {
    let customer_idx = records
        .column_index(customer_column)
        .ok_or_else(|| format!("column {customer_column} not found"))?;
    let amount_idx = records
        .column_index(amount_column)
        .ok_or_else(|| format!("column {amount_column} not found"))?;

    struct Totals {
        customer: String,
        total: f64,
        amounts: usize,
        rows: usize,
    }

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Totals> = Vec::new();

    for row in records.rows() {
        let Some(customer) = row[customer_idx].key() else {
            continue;
        };
        let amount = &row[amount_idx];
        let amount = if amount.is_null() {
            None
        } else {
            Some(amount.as_f64().ok_or_else(|| {
                format!(
                    "column {amount_column} holds non-numeric {} values",
                    amount.type_name()
                )
            })?)
        };

        let idx = *positions.entry(customer.clone()).or_insert_with(|| {
            groups.push(Totals {
                customer,
                total: 0.0,
                amounts: 0,
                rows: 0,
            });
            groups.len() - 1
        });

        let group = &mut groups[idx];
        group.rows += 1;
        if let Some(amount) = amount {
            group.total += amount;
            group.amounts += 1;
        }
    }

    let totals: Vec<f64> = groups.iter().map(|group| group.total).collect();
    if totals.iter().any(|total| !total.is_finite()) {
        return Err(format!("column {amount_column} has non-finite customer totals"));
    }
    let segments = segment_customers(&totals);

    Ok(groups
        .into_iter()
        .zip(segments)
        .map(|(group, segment)| CustomerAggregate {
            avg_purchase: if group.amounts == 0 {
                0.0
            } else {
                group.total / group.amounts as f64
            },
            customer: group.customer,
            total_spent: group.total,
            purchase_count: group.rows,
            segment,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSpend {
    pub customer_column: String,
    pub customers: Vec<CustomerAggregate>,
    pub segment_counts: Vec<(ValueSegment, usize)>,
    pub top_customers: Vec<CustomerAggregate>,
}

impl CustomerSpend {
    fn from_aggregates(customer_column: &str, customers: Vec<CustomerAggregate>) -> Self {
        let segment_counts = ValueSegment::ALL
            .iter()
            .map(|segment| {
                let count = customers.iter().filter(|c| c.segment == *segment).count();
                (*segment, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        let mut ranked = customers.clone();
        ranked.sort_by(|a, b| {
            b.total_spent
                .partial_cmp(&a.total_spent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(TOP_CUSTOMERS);

        Self {
            customer_column: customer_column.to_string(),
            customers,
            segment_counts,
            top_customers: ranked,
        }
    }

    pub fn cards(&self) -> Vec<Card> {
        let total_customers = self.customers.len();
        let avg_value = mean(self.customers.iter().map(|c| c.total_spent));
        let avg_frequency = mean(self.customers.iter().map(|c| c.purchase_count as f64));
        let high_value = self
            .customers
            .iter()
            .filter(|c| c.segment == ValueSegment::High)
            .count();

        vec![
            Card::available("Total Customers", CardValue::Count(total_customers)),
            Card::new("Avg Customer Value", avg_value.map(CardValue::Money)),
            Card::available("High Value Customers", CardValue::Count(high_value)),
            Card::new("Avg Purchase Frequency", avg_frequency.map(CardValue::Ratio)),
        ]
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Metric<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        Metric::unavailable("no values")
    } else {
        Metric::Available(sum / count as f64)
    }
}

/// One equal-width histogram bin; the last bin is closed on the right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::MAX, f64::min);
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let (low, high) = if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    };
    let width = (high - low) / bins as f64;

    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            start: low + width * i as f64,
            end: low + width * (i + 1) as f64,
            count: 0,
        })
        .collect();

    for &value in values {
        let idx = (((value - low) / width).floor() as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerFrequency {
    pub customer_column: String,
    pub counts: Vec<ValueCount>,
    pub top: Vec<ValueCount>,
    pub distribution: Vec<HistogramBin>,
    pub mean_frequency: Metric<f64>,
    pub max_frequency: Metric<usize>,
    pub single_purchase_customers: usize,
}

pub fn customer_frequency(records: &RecordSet, customer_column: &str) -> CustomerFrequency {
    let counts = value_counts(records, customer_column);
    let frequencies: Vec<f64> = counts.iter().map(|c| c.count as f64).collect();

    CustomerFrequency {
        customer_column: customer_column.to_string(),
        top: counts.iter().take(TOP_FREQUENT_CUSTOMERS).cloned().collect(),
        distribution: histogram(&frequencies, FREQUENCY_BINS),
        mean_frequency: mean(frequencies.iter().copied()),
        max_frequency: match counts.first() {
            Some(top) => Metric::Available(top.count),
            None => Metric::unavailable("no customers"),
        },
        single_purchase_customers: counts.iter().filter(|c| c.count == 1).count(),
        counts,
    }
}

impl CustomerFrequency {
    pub fn cards(&self) -> Vec<Card> {
        vec![
            Card::available("Total Customers", CardValue::Count(self.counts.len())),
            Card::new(
                "Avg Purchases per Customer",
                self.mean_frequency.clone().map(CardValue::Ratio),
            ),
            Card::new(
                "Most Frequent Customer",
                self.max_frequency
                    .clone()
                    .map(|n| CardValue::Text(format!("{n} purchases"))),
            ),
            Card::available(
                "Single Purchase Customers",
                CardValue::Count(self.single_purchase_customers),
            ),
        ]
    }
}

/// Counts for one geography column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoCounts {
    pub column: String,
    pub counts: Vec<ValueCount>,
}

impl GeoCounts {
    fn load(records: &RecordSet, roles: &ColumnRoles, role: Role) -> Option<Self> {
        roles.primary(role).map(|column| GeoCounts {
            column: column.to_string(),
            counts: value_counts(records, column),
        })
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn top(&self, n: usize) -> Vec<ValueCount> {
        self.counts.iter().take(n).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeographyBreakdown {
    pub record_count: usize,
    pub column_count: usize,
    pub state: Option<GeoCounts>,
    pub city: Option<GeoCounts>,
    pub country: Option<GeoCounts>,
    pub completeness: Metric<f64>,
    pub unique_values: usize,
}

pub fn geography_breakdown(records: &RecordSet, roles: &ColumnRoles) -> GeographyBreakdown {
    let unique_values = records
        .columns()
        .iter()
        .map(|column| value_counts(records, column).len())
        .sum();

    GeographyBreakdown {
        record_count: records.len(),
        column_count: records.columns().len(),
        state: GeoCounts::load(records, roles, Role::State),
        city: GeoCounts::load(records, roles, Role::City),
        country: GeoCounts::load(records, roles, Role::Country),
        completeness: completeness(records),
        unique_values,
    }
}

impl GeographyBreakdown {
    /// Top 15 states, or cities when there is no state column.
    pub fn leading(&self) -> Option<(&'static str, Vec<ValueCount>)> {
        if let Some(state) = &self.state {
            Some(("States", state.top(TOP_GEO_VALUES)))
        } else {
            self.city
                .as_ref()
                .map(|city| ("Cities", city.top(TOP_GEO_VALUES)))
        }
    }

    /// Full country distribution, or the top 10 states when there is no country column.
    pub fn distribution(&self) -> Option<(&'static str, Vec<ValueCount>)> {
        if let Some(country) = &self.country {
            Some(("Country", country.counts.clone()))
        } else {
            self.state
                .as_ref()
                .map(|state| ("State", state.top(TOP_STATE_SLICES)))
        }
    }

    fn per_value(&self, geo: &GeoCounts) -> Metric<f64> {
        if geo.distinct() == 0 {
            Metric::unavailable(format!("no values in {}", geo.column))
        } else {
            Metric::Available(self.record_count as f64 / geo.distinct() as f64)
        }
    }

    fn max_per_value(geo: &GeoCounts) -> Metric<CardValue> {
        match geo.counts.first() {
            Some(top) => Metric::Available(CardValue::Count(top.count)),
            None => Metric::unavailable(format!("no values in {}", geo.column)),
        }
    }

    pub fn cards(&self) -> Vec<Card> {
        let first = match (&self.state, &self.city) {
            (Some(state), _) => Card::available("Total States", CardValue::Count(state.distinct())),
            (None, Some(city)) => Card::available("Total Cities", CardValue::Count(city.distinct())),
            (None, None) => Card::available("Total Records", CardValue::Count(self.record_count)),
        };

        let second = match (&self.country, &self.state) {
            (Some(country), _) => {
                Card::available("Total Countries", CardValue::Count(country.distinct()))
            }
            (None, Some(state)) => Card::new(
                "Top State",
                match state.counts.first() {
                    Some(top) => Metric::Available(CardValue::Text(top.value.clone())),
                    None => Metric::unavailable("no states"),
                },
            ),
            (None, None) => Card::available("Unique Values", CardValue::Count(self.unique_values)),
        };

        let third = match (&self.state, &self.city) {
            (Some(state), _) => Card::new(
                "Avg Customers/State",
                self.per_value(state).map(CardValue::Ratio),
            ),
            (None, Some(city)) => Card::new(
                "Avg Customers/City",
                self.per_value(city).map(CardValue::Ratio),
            ),
            (None, None) => Card::new(
                "Data Completeness",
                self.completeness.clone().map(CardValue::Percent),
            ),
        };

        let fourth = match (&self.state, &self.city) {
            (Some(state), _) => Card::new("Max Customers/State", Self::max_per_value(state)),
            (None, Some(city)) => Card::new("Max Customers/City", Self::max_per_value(city)),
            (None, None) => Card::available("Columns", CardValue::Count(self.column_count)),
        };

        vec![first, second, third, fourth]
    }
}

/// Percentage of non-null cells.
pub fn completeness(records: &RecordSet) -> Metric<f64> {
    let cells = records.cell_count();
    if cells == 0 {
        return Metric::unavailable("no cells");
    }
    let filled = cells - records.null_count();
    Metric::Available(filled as f64 / cells as f64 * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub column: String,
    pub counts: Vec<ValueCount>,
    pub top: Vec<ValueCount>,
}

pub fn category_breakdown(records: &RecordSet, roles: &ColumnRoles) -> Option<CategoryBreakdown> {
    let column = roles.primary(Role::Category)?;
    let counts = value_counts(records, column);
    Some(CategoryBreakdown {
        column: column.to_string(),
        top: counts.iter().take(TOP_CATEGORIES).cloned().collect(),
        counts,
    })
}

/// The customer-analysis panel for the selected tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "panel", rename_all = "snake_case")]
pub enum CustomerPanel {
    Spend { analysis: Metric<CustomerSpend> },
    Frequency { analysis: CustomerFrequency },
    Geography { analysis: GeographyBreakdown },
    Records { note: String, sample: RecordSet },
}

pub fn customer_panel(tier: AnalysisTier, records: &RecordSet, roles: &ColumnRoles) -> CustomerPanel {
    let customer = roles.primary(Role::Customer);
    let amount = roles.primary(Role::Amount);

    match (tier, customer, amount) {
        (AnalysisTier::CustomerSpend, Some(customer), Some(amount)) => {
            let analysis = match customer_aggregates(records, customer, amount) {
                Ok(customers) if customers.is_empty() => {
                    Metric::unavailable("no customers in the current selection")
                }
                Ok(customers) => {
                    Metric::Available(CustomerSpend::from_aggregates(customer, customers))
                }
                Err(reason) => {
                    tracing::warn!(%reason, "customer analysis unavailable");
                    Metric::Unavailable(reason)
                }
            };
            CustomerPanel::Spend { analysis }
        }
        (AnalysisTier::CustomerFrequency, Some(customer), _) => CustomerPanel::Frequency {
            analysis: customer_frequency(records, customer),
        },
        (AnalysisTier::Geography, _, _) => CustomerPanel::Geography {
            analysis: geography_breakdown(records, roles),
        },
        _ => CustomerPanel::Records {
            note: "No geographic columns (state, country, city) detected for geographic analysis."
                .to_string(),
            sample: records.head(10),
        },
    }
}

impl CustomerPanel {
    pub fn cards(&self) -> Vec<Card> {
        match self {
            CustomerPanel::Spend {
                analysis: Metric::Available(spend),
            } => spend.cards(),
            CustomerPanel::Spend { .. } => Vec::new(),
            CustomerPanel::Frequency { analysis } => analysis.cards(),
            CustomerPanel::Geography { analysis } => analysis.cards(),
            CustomerPanel::Records { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::models::Value;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> RecordSet {
        RecordSet::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn purchases() -> RecordSet {
        table(
            &["customer_id", "category", "amount"],
            vec![
                vec![Value::Int(1), text("A"), Value::Int(10)],
                vec![Value::Int(1), text("B"), Value::Int(20)],
                vec![Value::Int(2), text("A"), Value::Int(5)],
            ],
        )
    }

    #[test]
    fn aggregates_match_worked_example() {
        let customers = customer_aggregates(&purchases(), "customer_id", "amount").unwrap();
        assert_eq!(customers.len(), 2);

        assert_eq!(customers[0].customer, "1");
        assert_eq!(customers[0].total_spent, 30.0);
        assert_eq!(customers[0].purchase_count, 2);
        assert_eq!(customers[0].avg_purchase, 15.0);

        assert_eq!(customers[1].customer, "2");
        assert_eq!(customers[1].total_spent, 5.0);
        assert_eq!(customers[1].purchase_count, 1);
        assert_eq!(customers[1].avg_purchase, 5.0);

        assert_eq!(customers[0].segment, ValueSegment::High);
        assert_eq!(customers[1].segment, ValueSegment::Low);
    }

    #[test]
    fn infinite_totals_make_segmentation_unavailable() {
        let records = table(
            &["customer_id", "amount"],
            vec![
                vec![Value::Int(1), Value::Float(f64::INFINITY)],
                vec![Value::Int(2), Value::Int(3)],
                vec![Value::Int(3), Value::Int(5)],
            ],
        );
        assert!(customer_aggregates(&records, "customer_id", "amount").is_err());

        let roles = classify(records.columns());
        let panel = customer_panel(AnalysisTier::CustomerSpend, &records, &roles);
        assert!(matches!(
            panel,
            CustomerPanel::Spend {
                analysis: Metric::Unavailable(_)
            }
        ));
    }

    #[test]
    fn purchase_counts_sum_to_row_count() {
        let rows = (0..50)
            .map(|i| vec![Value::Int(i % 7), text("A"), Value::Float(i as f64 * 1.5)])
            .collect();
        let records = table(&["customer_id", "category", "amount"], rows);
        let customers = customer_aggregates(&records, "customer_id", "amount").unwrap();
        let total: usize = customers.iter().map(|c| c.purchase_count).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn segments_partition_every_customer() {
        let totals = [0.0, 1.0, 3.3, 5.0, 6.7, 9.99, 10.0, 42.0];
        let segments = segment_customers(&totals);
        assert_eq!(segments.len(), totals.len());

        let counted: usize = ValueSegment::ALL
            .iter()
            .map(|s| segments.iter().filter(|seg| *seg == s).count())
            .sum();
        assert_eq!(counted, totals.len());
        assert_eq!(segments[0], ValueSegment::Low);
        assert_eq!(segments[7], ValueSegment::High);
    }

    #[test]
    fn equal_totals_fall_in_the_middle_bin() {
        assert_eq!(
            segment_customers(&[7.0, 7.0]),
            vec![ValueSegment::Medium, ValueSegment::Medium]
        );
        assert_eq!(segment_customers(&[0.0]), vec![ValueSegment::Medium]);
    }

    #[test]
    fn segment_edges_follow_right_closed_bins() {
        let edges = segment_edges(0.0, 30.0);
        assert!(edges[0] < 0.0);
        assert_eq!(edges[1], 10.0);
        assert_eq!(edges[2], 20.0);
        assert_eq!(
            segment_customers(&[0.0, 10.0, 10.5, 20.0, 30.0]),
            vec![
                ValueSegment::Low,
                ValueSegment::Low,
                ValueSegment::Medium,
                ValueSegment::Medium,
                ValueSegment::High
            ]
        );
    }

    #[test]
    fn amount_summary_over_filtered_rows() {
        let records = purchases();
        let roles = classify(records.columns());
        let summary = amount_summary(&records, &roles);
        assert_eq!(summary.sum, Metric::Available(35.0));
        assert_eq!(summary.max, Metric::Available(20.0));
        assert_eq!(summary.min, Metric::Available(5.0));
        let mean = *summary.mean.as_option().unwrap();
        assert!((mean - 35.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_amount_column_reports_unavailable() {
        let records = table(&["customer_id"], vec![vec![Value::Int(1)]]);
        let roles = classify(records.columns());
        let summary = amount_summary(&records, &roles);
        assert!(!summary.mean.is_available());
        assert!(!summary.sum.is_available());
        assert!(!summary.max.is_available());
        assert!(!summary.min.is_available());

        let cards = key_metrics(&records, &roles).cards();
        assert_eq!(cards[0].label, "Total Records");
        assert_eq!(cards[0].display_value(), "1");
        assert_eq!(cards[2].label, "Date Range");
        assert_eq!(cards[2].display_value(), "N/A");

        let dated = table(&["customer_id", "order_date"], vec![vec![Value::Int(1), Value::Null]]);
        let cards = key_metrics(&dated, &classify(dated.columns())).cards();
        assert_eq!(cards[2].display_value(), "1");
    }

    #[test]
    fn all_null_amount_sums_to_zero() {
        let records = table(&["amount"], vec![vec![Value::Null], vec![Value::Null]]);
        let roles = classify(records.columns());
        let summary = amount_summary(&records, &roles);
        assert_eq!(summary.sum, Metric::Available(0.0));
        assert!(!summary.mean.is_available());
        assert!(!summary.min.is_available());
    }

    #[test]
    fn text_amount_column_is_unavailable_not_an_error() {
        let records = table(
            &["customer_id", "amount"],
            vec![vec![Value::Int(1), text("ten")]],
        );
        let roles = classify(records.columns());
        let summary = amount_summary(&records, &roles);
        assert!(matches!(summary.mean, Metric::Unavailable(ref r) if r.contains("non-numeric")));

        let panel = customer_panel(select_tier(&roles), &records, &roles);
        assert!(matches!(
            panel,
            CustomerPanel::Spend {
                analysis: Metric::Unavailable(_)
            }
        ));
    }

    #[test]
    fn tier_cascade_prefers_customer_then_geography_then_category() {
        let tier = |cols: &[&str]| {
            select_tier(&classify(&cols.iter().map(|c| c.to_string()).collect::<Vec<_>>()))
        };
        assert_eq!(tier(&["customer_id", "amount", "state"]), AnalysisTier::CustomerSpend);
        assert_eq!(tier(&["customer_id", "state"]), AnalysisTier::CustomerFrequency);
        assert_eq!(tier(&["state", "category", "amount"]), AnalysisTier::Geography);
        assert_eq!(tier(&["category", "amount"]), AnalysisTier::Category);
        assert_eq!(tier(&["region"]), AnalysisTier::None);
    }

    #[test]
    fn frequency_analysis_without_amount() {
        let records = table(
            &["customer_id"],
            vec![
                vec![text("a")],
                vec![text("b")],
                vec![text("a")],
                vec![text("c")],
                vec![text("a")],
                vec![Value::Null],
            ],
        );
        let frequency = customer_frequency(&records, "customer_id");
        assert_eq!(frequency.counts[0], ValueCount { value: "a".to_string(), count: 3 });
        assert_eq!(frequency.max_frequency, Metric::Available(3));
        assert_eq!(frequency.single_purchase_customers, 2);
        assert_eq!(frequency.mean_frequency, Metric::Available(5.0 / 3.0));
        let binned: usize = frequency.distribution.iter().map(|b| b.count).sum();
        assert_eq!(binned, 3);
    }

    #[test]
    fn geography_ratios_are_unavailable_for_empty_views() {
        let records = table(&["state", "country"], Vec::new());
        let roles = classify(records.columns());
        let geo = geography_breakdown(&records, &roles);
        let cards = geo.cards();
        assert_eq!(cards[0].display_value(), "0");
        assert_eq!(cards[2].label, "Avg Customers/State");
        assert_eq!(cards[2].display_value(), "N/A");
        assert_eq!(cards[3].display_value(), "N/A");
    }

    #[test]
    fn geography_prefers_state_then_city() {
        let records = table(
            &["city", "state"],
            vec![
                vec![text("Austin"), text("TX")],
                vec![text("Dallas"), text("TX")],
                vec![text("Reno"), text("NV")],
            ],
        );
        let roles = classify(records.columns());
        let geo = geography_breakdown(&records, &roles);
        let (label, leading) = geo.leading().unwrap();
        assert_eq!(label, "States");
        assert_eq!(leading[0].value, "TX");
        let (label, slices) = geo.distribution().unwrap();
        assert_eq!(label, "State");
        assert_eq!(slices.len(), 2);
        assert_eq!(geo.cards()[1].display_value(), "TX");
        assert_eq!(geo.cards()[2].display_value(), "1.5");
    }

    #[test]
    fn geography_uses_city_and_country_without_state() {
        let records = table(
            &["city", "country"],
            vec![
                vec![text("Lyon"), text("FR")],
                vec![text("Lyon"), text("FR")],
                vec![text("Porto"), text("PT")],
            ],
        );
        let roles = classify(records.columns());
        let geo = geography_breakdown(&records, &roles);

        let (label, leading) = geo.leading().unwrap();
        assert_eq!(label, "Cities");
        assert_eq!(leading[0].value, "Lyon");
        assert_eq!(leading[0].count, 2);
        let (label, slices) = geo.distribution().unwrap();
        assert_eq!(label, "Country");
        assert_eq!(slices.len(), 2);

        let cards: Vec<(String, String)> = geo
            .cards()
            .iter()
            .map(|card| (card.label.clone(), card.display_value()))
            .collect();
        assert_eq!(
            cards,
            vec![
                ("Total Cities".to_string(), "2".to_string()),
                ("Total Countries".to_string(), "2".to_string()),
                ("Avg Customers/City".to_string(), "1.5".to_string()),
                ("Max Customers/City".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn country_only_geography_falls_back_to_table_cards() {
        let records = table(
            &["country"],
            vec![vec![text("FR")], vec![text("PT")], vec![Value::Null], vec![text("FR")]],
        );
        let roles = classify(records.columns());
        let geo = geography_breakdown(&records, &roles);

        assert!(geo.leading().is_none());
        let (label, slices) = geo.distribution().unwrap();
        assert_eq!(label, "Country");
        assert_eq!(slices[0].value, "FR");

        let cards: Vec<(String, String)> = geo
            .cards()
            .iter()
            .map(|card| (card.label.clone(), card.display_value()))
            .collect();
        assert_eq!(
            cards,
            vec![
                ("Total Records".to_string(), "4".to_string()),
                ("Unique Values".to_string(), "2".to_string()),
                ("Data Completeness".to_string(), "75.0%".to_string()),
                ("Columns".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn category_breakdown_keeps_top_ten() {
        let rows = (0..30).map(|i| vec![text(&format!("c{}", i % 12))]).collect();
        let records = table(&["category"], rows);
        let roles = classify(records.columns());
        let breakdown = category_breakdown(&records, &roles).unwrap();
        assert_eq!(breakdown.counts.len(), 12);
        assert_eq!(breakdown.top.len(), 10);
        assert_eq!(breakdown.top[0].count, 3);
    }

    #[test]
    fn card_values_format_like_metric_cards() {
        assert_eq!(CardValue::Money(1234567.891).to_string(), "$1,234,567.89");
        assert_eq!(CardValue::Money(-5.0).to_string(), "-$5.00");
        assert_eq!(CardValue::Count(5000).to_string(), "5,000");
        assert_eq!(CardValue::Percent(99.24).to_string(), "99.2%");
    }

    #[test]
    fn histogram_places_max_in_last_bin() {
        let bins = histogram(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins.iter().map(|b| b.count).collect::<Vec<_>>(), vec![1, 1, 2]);
        assert_eq!(histogram(&[2.0, 2.0], 20).iter().map(|b| b.count).sum::<usize>(), 2);
    }
}
