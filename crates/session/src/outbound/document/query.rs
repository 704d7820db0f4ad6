use std::cmp::Ordering;

use super::{FieldValue, Fields};

/// Upper bound of a prefix range scan.
const PREFIX_RANGE_END: char = '\u{f8ff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Operator {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "EQUAL",
            Operator::NotEqual => "NOT_EQUAL",
            Operator::LessThan => "LESS_THAN",
            Operator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Equal => ordering == Ordering::Equal,
            Operator::NotEqual => ordering != Ordering::Equal,
            Operator::LessThan => ordering == Ordering::Less,
            Operator::LessThanOrEqual => ordering != Ordering::Greater,
            Operator::GreaterThan => ordering == Ordering::Greater,
            Operator::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Operator,
    pub value: FieldValue,
}

/// Filters joined with AND, then ordering, then a result cap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// String values of `field` starting with `prefix`, ordered by `field`.
    pub fn prefix(field: &str, prefix: &str) -> Self {
        Self::new()
            .filter(field, Operator::GreaterThanOrEqual, FieldValue::String(prefix.to_string()))
            .filter(field, Operator::LessThanOrEqual, FieldValue::String(format!("{prefix}{PREFIX_RANGE_END}")))
            .order_by(field, Direction::Ascending)
    }

    pub fn filter(mut self, field: &str, op: Operator, value: FieldValue) -> Self {
        self.filters.push(Filter { field: field.to_string(), op, value });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, count: u32) -> Self {
        self.limit = Some(count);
        self
    }

    /// Whether a document passes every filter. Values of different types
    /// never match, and neither do documents missing an ordered field.
    pub(crate) fn matches(&self, fields: &Fields) -> bool {
        let filtered = self.filters.iter().all(|filter| {
            fields
                .get(&filter.field)
                .and_then(|value| compare(value, &filter.value))
                .is_some_and(|ordering| filter.op.accepts(ordering))
        });
        filtered && self.order_by.iter().all(|(field, _)| fields.contains_key(field))
    }

    /// Orders two documents by the sort fields, then by id.
    pub(crate) fn order(&self, a: (&str, &Fields), b: (&str, &Fields)) -> Ordering {
        for (field, direction) in &self.order_by {
            let ordering = match (a.1.get(field), b.1.get(field)) {
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            let ordering = match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.0.cmp(b.0)
    }
}

fn compare(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => Some(x.cmp(y)),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => Some(x.cmp(y)),
        (FieldValue::Integer(x), FieldValue::Double(y)) => (*x as f64).partial_cmp(y),
        (FieldValue::Double(x), FieldValue::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (FieldValue::Double(x), FieldValue::Double(y)) => x.partial_cmp(y),
        (FieldValue::String(x), FieldValue::String(y)) => Some(x.cmp(y)),
        (FieldValue::Timestamp(x), FieldValue::Timestamp(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
