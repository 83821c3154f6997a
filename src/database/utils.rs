use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use sqlx::{Postgres, postgres::PgArguments, query::QueryAs};
use uuid::Uuid;

use crate::database::models::{PageRequest, TimeWindow};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?").expect("placeholder pattern is valid"));

/// Collapses whitespace and numbers `?` placeholders as `$1, $2, ...`.
pub fn sql(query: &str) -> String {
    let cleaned = query.split_whitespace().collect::<Vec<&str>>().join(" ");
    let mut param_index = 0;
    PLACEHOLDER
        .replace_all(&cleaned, |_: &Captures| {
            param_index += 1;
            format!("${}", param_index)
        })
        .into_owned()
}

#[derive(Debug, Clone, Copy)]
enum FilterValue {
    Id(Uuid),
    Time(DateTime<Utc>),
}

/// WHERE clause assembled from optional filters, with its bind values in order.
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    values: Vec<FilterValue>,
}

impl Conditions {
    /// A clause without placeholders.
    pub fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    /// A clause with a single `?` bound to `id`.
    pub fn push_id(&mut self, clause: impl Into<String>, id: Uuid) {
        self.clauses.push(clause.into());
        self.values.push(FilterValue::Id(id));
    }

    /// `column` within the half-open window, when there is one.
    pub fn push_window(&mut self, column: &str, window: Option<&TimeWindow>) {
        if let Some(window) = window {
            self.clauses.push(format!("{column} >= ? AND {column} < ?"));
            self.values.push(FilterValue::Time(window.from));
            self.values.push(FilterValue::Time(window.to));
        }
    }

    /// ` WHERE a AND b`, or nothing when no filter applies.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            return String::new();
        }
        format!(" WHERE {}", self.clauses.join(" AND "))
    }

    pub fn bind<'q, O>(
        &self,
        mut query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> QueryAs<'q, Postgres, O, PgArguments> {
        for value in &self.values {
            query = match *value {
                FilterValue::Id(id) => query.bind(id),
                FilterValue::Time(at) => query.bind(at),
            };
        }
        query
    }
}

/// `LIMIT` and `OFFSET` values for a page.
pub fn page_bounds(page: &PageRequest) -> (i64, i64) {
    (
        i64::from(page.per_page()),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}
