use std::collections::BTreeSet;

use crate::classify::{ColumnRoles, Role};
use crate::models::RecordSet;

/// Sorted distinct values of the category column, as offered to the user.
pub fn category_options(records: &RecordSet, roles: &ColumnRoles) -> Vec<String> {
    let Some(column) = roles.primary(Role::Category) else {
        return Vec::new();
    };

    records
        .column_values(column)
        .into_iter()
        .filter_map(|value| value.key())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// User selection of category values. Empty means "all categories".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    pub selected: Vec<String>,
}

impl CategoryFilter {
    pub fn new(selected: Vec<String>) -> Self {
        let selected = selected
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();
        Self { selected }
    }

    /// Parses a comma-separated selection such as `Books,Toys`.
    pub fn from_csv_param(param: Option<&str>) -> Self {
        match param {
            Some(raw) => Self::new(raw.split(',').map(str::to_string).collect()),
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn apply(&self, records: &RecordSet, roles: &ColumnRoles) -> FilteredView {
        let Some(column) = roles.primary(Role::Category) else {
            return FilteredView {
                records: records.clone(),
                status: "No category columns available for filtering.".to_string(),
            };
        };

        if self.selected.is_empty() {
            return FilteredView {
                records: records.clone(),
                status: "Showing data for all categories".to_string(),
            };
        }

        let Some(idx) = records.column_index(column) else {
            return FilteredView {
                records: records.clone(),
                status: format!("Category column {column} not found; showing all rows"),
            };
        };

        let filtered = records.filter_rows(|row| {
            row[idx]
                .key()
                .map(|key| self.selected.contains(&key))
                .unwrap_or(false)
        });

        FilteredView {
            records: filtered,
            status: format!(
                "Showing data for {} selected category(ies): {}",
                self.selected.len(),
                self.selected.join(", ")
            ),
        }
    }
}

/// Row subset produced by a category filter, recomputed per request.
#[derive(Debug, Clone)]
pub struct FilteredView {
    pub records: RecordSet,
    pub status: String,
}
