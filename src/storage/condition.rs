// ============================================================================
// Conditions
// ============================================================================
//
// Boolean expressions over a single item. The store evaluates a write
// condition against the current version of the row atomically with the
// write; a query filter is evaluated against each item it reads.
//
// ============================================================================

use crate::core::{Item, Result, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::Eq, Some(o)) => o == Ordering::Equal,
            (Self::Ne, Some(o)) => o != Ordering::Equal,
            (Self::Ne, None) => true,
            (Self::Lt, Some(o)) => o == Ordering::Less,
            (Self::Le, Some(o)) => o != Ordering::Greater,
            (Self::Gt, Some(o)) => o == Ordering::Greater,
            (Self::Ge, Some(o)) => o != Ordering::Less,
            (_, None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
    Compare {
        name: String,
        op: CompareOp,
        value: Value,
    },
    Between {
        name: String,
        low: Value,
        high: Value,
    },
    BeginsWith {
        name: String,
        prefix: Value,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

/// Entry point of the condition builder: `attr("version").eq(3)`.
pub fn attr(name: impl Into<String>) -> AttrPath {
    AttrPath(name.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath(String);

impl AttrPath {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Condition {
        Condition::Compare {
            name: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn exists(self) -> Condition {
        Condition::AttributeExists(self.0)
    }

    pub fn not_exists(self) -> Condition {
        Condition::AttributeNotExists(self.0)
    }

    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Ge, value)
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        Condition::Between {
            name: self.0,
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn begins_with(self, prefix: impl Into<Value>) -> Condition {
        Condition::BeginsWith {
            name: self.0,
            prefix: prefix.into(),
        }
    }
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// Evaluates against the current item; `None` is a row that does not exist.
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        let lookup = |name: &str| item.and_then(|i| i.get(name));
        match self {
            Self::AttributeExists(name) => lookup(name).is_some(),
            Self::AttributeNotExists(name) => lookup(name).is_none(),
            Self::Compare { name, op, value } => match lookup(name) {
                Some(current) => op.holds(compare_values(current, value)),
                None => *op == CompareOp::Ne,
            },
            Self::Between { name, low, high } => lookup(name).is_some_and(|current| {
                CompareOp::Ge.holds(current.compare(low)) && CompareOp::Le.holds(current.compare(high))
            }),
            Self::BeginsWith { name, prefix } => {
                lookup(name).is_some_and(|current| begins_with(current, prefix))
            }
            Self::And(left, right) => left.evaluate(item) && right.evaluate(item),
            Self::Or(left, right) => left.evaluate(item) || right.evaluate(item),
            Self::Not(inner) => !inner.evaluate(item),
        }
    }

    /// Rewrites every operand value, keeping the shape of the expression.
    pub fn map_values(&self, f: &dyn Fn(&Value) -> Result<Value>) -> Result<Condition> {
        Ok(match self {
            Self::AttributeExists(_) | Self::AttributeNotExists(_) => self.clone(),
            Self::Compare { name, op, value } => Self::Compare {
                name: name.clone(),
                op: *op,
                value: f(value)?,
            },
            Self::Between { name, low, high } => Self::Between {
                name: name.clone(),
                low: f(low)?,
                high: f(high)?,
            },
            Self::BeginsWith { name, prefix } => Self::BeginsWith {
                name: name.clone(),
                prefix: f(prefix)?,
            },
            Self::And(left, right) => left.map_values(f)?.and(right.map_values(f)?),
            Self::Or(left, right) => left.map_values(f)?.or(right.map_values(f)?),
            Self::Not(inner) => inner.map_values(f)?.negate(),
        })
    }
}

fn compare_values(current: &Value, expected: &Value) -> Option<Ordering> {
    match current.compare(expected) {
        Some(ordering) => Some(ordering),
        // Lists and maps only support equality.
        None if current == expected => Some(Ordering::Equal),
        None => None,
    }
}

fn begins_with(current: &Value, prefix: &Value) -> bool {
    match (current, prefix) {
        (Value::Text(s), Value::Text(p)) => s.starts_with(p.as_str()),
        (Value::Binary(b), Value::Binary(p)) => b.starts_with(p),
        _ => false,
    }
}

/// Predicate on the range key of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOp {
    Eq(Value),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    Between(Value, Value),
    BeginsWith(Value),
}

/// Key condition of a query: hash equality plus an optional range predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub hash_name: String,
    pub hash_value: Value,
    pub range: Option<(String, RangeOp)>,
}

impl KeyCondition {
    pub fn hash(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            hash_name: name.into(),
            hash_value: value.into(),
            range: None,
        }
    }

    pub fn range(mut self, name: impl Into<String>, op: RangeOp) -> Self {
        self.range = Some((name.into(), op));
        self
    }

    pub fn to_condition(&self) -> Condition {
        let hash = attr(self.hash_name.clone()).eq(self.hash_value.clone());
        let Some((name, op)) = &self.range else {
            return hash;
        };
        let path = attr(name.clone());
        let range = match op {
            RangeOp::Eq(v) => path.eq(v.clone()),
            RangeOp::Lt(v) => path.lt(v.clone()),
            RangeOp::Le(v) => path.le(v.clone()),
            RangeOp::Gt(v) => path.gt(v.clone()),
            RangeOp::Ge(v) => path.ge(v.clone()),
            RangeOp::Between(low, high) => path.between(low.clone(), high.clone()),
            RangeOp::BeginsWith(prefix) => path.begins_with(prefix.clone()),
        };
        hash.and(range)
    }

    pub fn map_values(&self, f: &dyn Fn(&Value) -> Result<Value>) -> Result<KeyCondition> {
        let range = match &self.range {
            None => None,
            Some((name, op)) => {
                let op = match op {
                    RangeOp::Eq(v) => RangeOp::Eq(f(v)?),
                    RangeOp::Lt(v) => RangeOp::Lt(f(v)?),
                    RangeOp::Le(v) => RangeOp::Le(f(v)?),
                    RangeOp::Gt(v) => RangeOp::Gt(f(v)?),
                    RangeOp::Ge(v) => RangeOp::Ge(f(v)?),
                    RangeOp::Between(low, high) => RangeOp::Between(f(low)?, f(high)?),
                    RangeOp::BeginsWith(prefix) => RangeOp::BeginsWith(f(prefix)?),
                };
                Some((name.clone(), op))
            }
        };
        Ok(KeyCondition {
            hash_name: self.hash_name.clone(),
            hash_value: f(&self.hash_value)?,
            range,
        })
    }
}
