use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

/// Semantic role a column plays on the dashboard, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Date,
    Amount,
    Category,
    Customer,
    State,
    Country,
    City,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Date,
        Role::Amount,
        Role::Category,
        Role::Customer,
        Role::State,
        Role::Country,
        Role::City,
    ];

    /// Lowercase substrings that assign a column to this role.
    pub fn triggers(self) -> &'static [&'static str] {
        match self {
            Role::Date => &["date", "time"],
            Role::Amount => &["amount", "price", "value"],
            Role::Category => &["category", "product", "type"],
            Role::Customer => &["customer", "user", "id"],
            Role::State => &["state", "province"],
            Role::Country => &["country"],
            Role::City => &["city"],
        }
    }

    pub fn matches(self, column: &str) -> bool {
        let lowered = column.to_lowercase();
        self.triggers().iter().any(|trigger| lowered.contains(trigger))
    }

    pub fn is_geography(self) -> bool {
        matches!(self, Role::State | Role::Country | Role::City)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Date => "date",
            Role::Amount => "amount",
            Role::Category => "category",
            Role::Customer => "customer",
            Role::State => "state",
            Role::Country => "country",
            Role::City => "city",
        };
        f.write_str(label)
    }
}

/// Every column matching each role, in table order.
///
/// Only the first match per role (`primary`) is used downstream. A table with
/// both `user_id` and `customer_id` resolves the customer role to whichever
/// comes first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnRoles {
    matches: BTreeMap<Role, Vec<String>>,
}

impl ColumnRoles {
    pub fn primary(&self, role: Role) -> Option<&str> {
        self.matches
            .get(&role)
            .and_then(|columns| columns.first())
            .map(String::as_str)
    }

    pub fn candidates(&self, role: Role) -> &[String] {
        self.matches.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, role: Role) -> bool {
        self.primary(role).is_some()
    }

    pub fn has_geography(&self) -> bool {
        Role::ALL
            .iter()
            .any(|role| role.is_geography() && self.has(*role))
    }

    /// Role → primary column, for display.
    pub fn assignments(&self) -> Vec<(Role, Option<&str>)> {
        Role::ALL
            .iter()
            .map(|role| (*role, self.primary(*role)))
            .collect()
    }
}

pub fn classify(columns: &[String]) -> ColumnRoles {
    let mut matches: BTreeMap<Role, Vec<String>> = BTreeMap::new();

    for column in columns {
        for role in Role::ALL {
            if role.matches(column) {
                matches.entry(role).or_default().push(column.clone());
            }
        }
    }

    for (role, columns) in matches.iter() {
        if columns.len() > 1 {
            debug!(
                %role,
                chosen = %columns[0],
                ignored = ?&columns[1..],
                "multiple columns match role; using the first"
            );
        }
    }

    ColumnRoles { matches }
}
