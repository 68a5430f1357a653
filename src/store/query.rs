//! # Query Specification
//!
//! Backing-store independent filter/sort/paginate description used by
//! [`EntityStore::find_all`](super::EntityStore::find_all).
//!
//! Addressable fields are `id`, `state`, `stateCount`, `stateTimestamp`
//! (epoch milliseconds), `errorDetail`, `leased` and `payload.<path>` for any
//! field of the serialized payload. A `state` operand may be given either as a
//! code or as a state name.
//!
//! Sorting on a field that is missing from any candidate, or whose values are
//! not mutually comparable, leaves the result in store order instead of
//! failing.

use super::{StoreError, StoreResult};
use crate::state_machine::{EntityPayload, EntityState, StatefulEntity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Like,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::NotEq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "in" => Some(Self::In),
            "like" => Some(Self::Like),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::Like => "like",
        };
        f.write_str(symbol)
    }
}

/// Single filter predicate: `operand_left operator operand_right`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub operand_left: String,
    pub operator: Operator,
    pub operand_right: Value,
}

impl Criterion {
    pub fn new(operand_left: impl Into<String>, operator: Operator, operand_right: impl Into<Value>) -> Self {
        Self {
            operand_left: operand_left.into(),
            operator,
            operand_right: operand_right.into(),
        }
    }

    /// Parse expressions such as `stateCount >= 2` or `payload.assetId = "asset-1"`
    ///
    /// The right operand is read as JSON when possible and as a bare string otherwise.
    pub fn parse(expression: &str) -> StoreResult<Self> {
        let mut parts = expression.trim().splitn(3, char::is_whitespace);
        let (Some(left), Some(op), Some(right)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(StoreError::InvalidQuery(format!(
                "Expected '<field> <operator> <value>', got '{expression}'"
            )));
        };

        let operator = Operator::parse(op).ok_or_else(|| {
            StoreError::InvalidQuery(format!("Unsupported operator '{op}' in '{expression}'"))
        })?;

        let right = right.trim();
        let operand_right =
            serde_json::from_str(right).unwrap_or_else(|_| Value::String(right.to_string()));

        Ok(Self {
            operand_left: left.to_string(),
            operator,
            operand_right,
        })
    }

    fn matches<S: EntityState, P: EntityPayload>(
        &self,
        entity: &StatefulEntity<S, P>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(actual) = field_value(entity, &self.operand_left, now) else {
            return false;
        };
        let expected = if self.operand_left == "state" {
            normalize_state_operand::<S>(&self.operand_right)
        } else {
            self.operand_right.clone()
        };

        match self.operator {
            Operator::Eq => values_equal(&actual, &expected),
            Operator::NotEq => !values_equal(&actual, &expected),
            Operator::Lt => compare_values(&actual, &expected) == Some(Ordering::Less),
            Operator::Le => matches!(
                compare_values(&actual, &expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Gt => compare_values(&actual, &expected) == Some(Ordering::Greater),
            Operator::Ge => matches!(
                compare_values(&actual, &expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::In => match &expected {
                Value::Array(candidates) => candidates.iter().any(|c| values_equal(&actual, c)),
                single => values_equal(&actual, single),
            },
            Operator::Like => match (&actual, &expected) {
                (Value::String(text), Value::String(pattern)) => like_match(text, pattern),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.operand_left, self.operator, self.operand_right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter, sort and pagination for `find_all`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub filter: Vec<Criterion>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    pub offset: usize,
    pub limit: usize,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            filter: Vec::new(),
            sort_field: None,
            sort_order: SortOrder::Asc,
            offset: 0,
            limit: 50,
        }
    }
}

impl QuerySpec {
    /// Query returning every entity
    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, criterion: Criterion) -> Self {
        self.filter.push(criterion);
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = order;
        self
    }

    pub fn with_range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Evaluate the query against an in-memory candidate set
    pub fn apply<S: EntityState, P: EntityPayload>(
        &self,
        candidates: impl IntoIterator<Item = StatefulEntity<S, P>>,
        now: DateTime<Utc>,
    ) -> Vec<StatefulEntity<S, P>> {
        let mut matched: Vec<StatefulEntity<S, P>> = candidates
            .into_iter()
            .filter(|entity| self.filter.iter().all(|c| c.matches(entity, now)))
            .collect();

        if let Some(field) = &self.sort_field {
            self.sort_in_place(&mut matched, field, now);
        }

        matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }

    fn sort_in_place<S: EntityState, P: EntityPayload>(
        &self,
        entities: &mut Vec<StatefulEntity<S, P>>,
        field: &str,
        now: DateTime<Utc>,
    ) {
        let keys: Option<Vec<Value>> = entities
            .iter()
            .map(|entity| field_value(entity, field, now))
            .collect();
        let Some(keys) = keys else {
            return;
        };
        if !keys
            .windows(2)
            .all(|pair| compare_values(&pair[0], &pair[1]).is_some())
        {
            return;
        }

        let mut keyed: Vec<(Value, StatefulEntity<S, P>)> =
            keys.into_iter().zip(entities.drain(..)).collect();
        keyed.sort_by(|a, b| {
            let ordering = compare_values(&a.0, &b.0).unwrap_or(Ordering::Equal);
            match self.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        entities.extend(keyed.into_iter().map(|(_, entity)| entity));
    }
}

/// Resolve a query field against an entity
pub fn field_value<S: EntityState, P: EntityPayload>(
    entity: &StatefulEntity<S, P>,
    field: &str,
    now: DateTime<Utc>,
) -> Option<Value> {
    match field {
        "id" => Some(Value::String(entity.id.clone())),
        "state" => Some(Value::from(entity.state.code())),
        "stateCount" => Some(Value::from(entity.state_count)),
        "stateTimestamp" => Some(Value::from(entity.state_timestamp.timestamp_millis())),
        "errorDetail" => Some(
            entity
                .error_detail
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        ),
        "leased" => Some(Value::Bool(entity.is_leased(now))),
        "createdAt" => Some(Value::from(entity.created_at.timestamp_millis())),
        other => {
            let path = other.strip_prefix("payload.")?;
            let mut current = serde_json::to_value(&entity.payload).ok()?;
            for segment in path.split('.') {
                current = match current {
                    Value::Object(mut map) => map.remove(segment)?,
                    Value::Array(mut items) => {
                        let index: usize = segment.parse().ok()?;
                        if index < items.len() {
                            items.swap_remove(index)
                        } else {
                            return None;
                        }
                    }
                    _ => return None,
                };
            }
            Some(current)
        }
    }
}

fn normalize_state_operand<S: EntityState>(operand: &Value) -> Value {
    let by_name = |name: &str| {
        S::all()
            .iter()
            .find(|state| state.name().eq_ignore_ascii_case(name))
            .map(|state| Value::from(state.code()))
    };

    match operand {
        Value::String(name) => by_name(name).unwrap_or_else(|| operand.clone()),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(name) => by_name(name).unwrap_or_else(|| item.clone()),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL `LIKE` with `%` as the only wildcard
fn like_match(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let mut remaining = text;
    let last = parts.len() - 1;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            match remaining.strip_prefix(part) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if index == last {
            return remaining.ends_with(part);
        } else {
            match remaining.find(part) {
                Some(position) => remaining = &remaining[position + part.len()..],
                None => return false,
            }
        }
    }
    true
}
