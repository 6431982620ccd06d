//! Typed filter expressions and the `column__operator` string form.
//!
//! A [`Query`] is built either from typed [`Column`] handles, which only
//! accept columns of the queried entity, or from loosely typed request
//! parameters via [`Query::from_params`]. Both produce the same untyped
//! [`QuerySpec`] that crosses the durable store seam.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::domain::schema::{Column, ColumnDef, Entity, Row, Value};

/// Parameter keys consumed as query options, never as column predicates.
pub const RESERVED_KEYS: [&str; 5] = ["order_by", "order", "offset", "limit", "subquery"];

const KEY_SEPARATOR: &str = "__";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid value for filter `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
}

impl FilterError {
    fn invalid_value(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    In,
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Like,
    ILike,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::In => "in",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Ge => "ge",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Like => "like",
            Operator::ILike => "ilike",
        }
    }

    /// SQL spelling of the operator.
    pub fn sql(self) -> &'static str {
        match self {
            Operator::In => "IN",
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = FilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in" => Ok(Operator::In),
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "ge" => Ok(Operator::Ge),
            "le" => Ok(Operator::Le),
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "like" => Ok(Operator::Like),
            "ilike" => Ok(Operator::ILike),
            other => Err(FilterError::UnknownOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(Value),
    List(Vec<Value>),
    /// A `LIKE` pattern, wildcards included.
    Pattern(String),
}

/// One `(column, operator, operand)` triple. Predicates in a query are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: ColumnDef,
    pub operator: Operator,
    pub operand: Operand,
}

impl Predicate {
    /// Evaluate against a stored row with SQL semantics: `NULL` never matches.
    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(self.column.name);
        if value.is_null() {
            return false;
        }

        match (&self.operator, &self.operand) {
            (Operator::In, Operand::List(candidates)) => candidates
                .iter()
                .any(|candidate| value.compare(candidate) == Some(Ordering::Equal)),
            (Operator::Like | Operator::ILike, Operand::Pattern(pattern)) => {
                let Some(text) = value.render() else {
                    return false;
                };
                like_match(&text, pattern, self.operator == Operator::ILike)
            }
            (operator, Operand::Single(expected)) => match value.compare(expected) {
                Some(ordering) => match operator {
                    Operator::Eq => ordering == Ordering::Equal,
                    Operator::Ne => ordering != Ordering::Equal,
                    Operator::Ge => ordering != Ordering::Less,
                    Operator::Le => ordering != Ordering::Greater,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::In | Operator::Like | Operator::ILike => false,
                },
                None => false,
            },
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternToken {
    Any,
    One,
    Literal(char),
}

/// SQL `LIKE` matching: `%` is any run, `_` one character, `\` escapes.
fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };
    let text: Vec<char> = text.chars().collect();

    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        tokens.push(match ch {
            '%' => PatternToken::Any,
            '_' => PatternToken::One,
            '\\' => PatternToken::Literal(chars.next().unwrap_or('\\')),
            other => PatternToken::Literal(other),
        });
    }

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(PatternToken::One) => {
                t += 1;
                p += 1;
            }
            Some(PatternToken::Literal(ch)) if *ch == text[t] => {
                t += 1;
                p += 1;
            }
            Some(PatternToken::Any) => {
                backtrack = Some((p, t));
                p += 1;
            }
            _ => match backtrack {
                Some((star, mark)) => {
                    p = star + 1;
                    t = mark + 1;
                    backtrack = Some((star, mark + 1));
                }
                None => return false,
            },
        }
    }

    tokens[p..].iter().all(|token| *token == PatternToken::Any)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: ColumnDef,
    pub direction: Direction,
}

/// Projection of `column` over the rows of `table` matching `predicates`.
///
/// Attached to a query, it restricts results to ids the projection yields,
/// e.g. "documents having at least one tag with this value".
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub table: &'static str,
    pub column: ColumnDef,
    pub predicates: Vec<Predicate>,
}

impl Subquery {
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(row))
    }
}

/// Untyped query handed to a durable store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub predicates: Vec<Predicate>,
    pub order: Option<OrderBy>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub subquery: Option<Subquery>,
}

impl QuerySpec {
    /// Whether `row` satisfies every column predicate. The subquery
    /// restriction is resolved by the store.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(row))
    }

    /// The same filter without ordering or pagination.
    pub fn unpaged(&self) -> QuerySpec {
        QuerySpec {
            predicates: self.predicates.clone(),
            order: None,
            offset: None,
            limit: None,
            subquery: self.subquery.clone(),
        }
    }
}

/// A predicate bound to entity `E`.
pub struct Condition<E> {
    predicate: Predicate,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Condition<E> {
    fn new(column: Column<E>, operator: Operator, operand: Operand) -> Self {
        Self {
            predicate: Predicate {
                column: column.def(),
                operator,
                operand,
            },
            _entity: PhantomData,
        }
    }

    pub fn into_predicate(self) -> Predicate {
        self.predicate
    }
}

impl<E> fmt::Debug for Condition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.predicate).finish()
    }
}

impl<E> Column<E> {
    pub fn eq(self, value: impl Into<Value>) -> Condition<E> {
        Condition::new(self, Operator::Eq, Operand::Single(value.into()))
    }

    pub fn ne(self, value: impl Into<Value>) -> Condition<E> {
        Condition::new(self, Operator::Ne, Operand::Single(value.into()))
    }

    pub fn ge(self, value: impl Into<Value>) -> Condition<E> {
        Condition::new(self, Operator::Ge, Operand::Single(value.into()))
    }

    pub fn le(self, value: impl Into<Value>) -> Condition<E> {
        Condition::new(self, Operator::Le, Operand::Single(value.into()))
    }

    pub fn gt(self, value: impl Into<Value>) -> Condition<E> {
        Condition::new(self, Operator::Gt, Operand::Single(value.into()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Condition<E> {
        Condition::new(self, Operator::Lt, Operand::Single(value.into()))
    }

    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Condition<E> {
        let values = values.into_iter().map(Into::into).collect();
        Condition::new(self, Operator::In, Operand::List(values))
    }

    /// Case-sensitive substring match.
    pub fn like(self, needle: impl AsRef<str>) -> Condition<E> {
        Condition::new(self, Operator::Like, substring_pattern(needle.as_ref()))
    }

    /// Case-insensitive substring match.
    pub fn ilike(self, needle: impl AsRef<str>) -> Condition<E> {
        Condition::new(self, Operator::ILike, substring_pattern(needle.as_ref()))
    }
}

fn substring_pattern(needle: &str) -> Operand {
    Operand::Pattern(format!("%{needle}%"))
}

/// Filter, ordering and pagination for entity type `E`.
pub struct Query<E> {
    spec: QuerySpec,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Default for Query<E> {
    fn default() -> Self {
        Self {
            spec: QuerySpec::default(),
            _entity: PhantomData,
        }
    }
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.spec).finish()
    }
}

impl<E> Query<E> {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition<E>) -> Self {
        self.spec.predicates.push(condition.into_predicate());
        self
    }

    pub fn order_by(mut self, column: Column<E>, direction: Direction) -> Self {
        self.spec.order = Some(OrderBy {
            column: column.def(),
            direction,
        });
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    pub fn subquery(mut self, subquery: Subquery) -> Self {
        self.spec.subquery = Some(subquery);
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }
}

impl<E: Entity> Query<E> {
    /// Build a query from `"<column>__<operator>"` parameters.
    ///
    /// Reserved keys set ordering and pagination. Unknown columns, unknown
    /// operators and `None` values are skipped; a value that cannot be
    /// coerced to its column type is an error.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        let mut order_column = None;
        let mut direction = None;

        for (key, value) in params {
            let key = key.as_ref();
            let Some(value) = value else {
                continue;
            };
            let value = value.as_ref();

            if RESERVED_KEYS.contains(&key) {
                match key {
                    "order_by" => order_column = E::column(value.trim()),
                    "order" => {
                        direction = match value {
                            "asc" => Some(Direction::Asc),
                            "desc" => Some(Direction::Desc),
                            _ => None,
                        }
                    }
                    "offset" => query.spec.offset = Some(parse_unsigned(key, value)?),
                    "limit" => query.spec.limit = Some(parse_unsigned(key, value)?),
                    _ => {}
                }
                continue;
            }

            if let Some(predicate) = parse_predicate::<E>(key, value)? {
                query.spec.predicates.push(predicate);
            }
        }

        if let (Some(column), Some(direction)) = (order_column, direction) {
            query.spec.order = Some(OrderBy { column, direction });
        }

        Ok(query)
    }
}

fn parse_unsigned(key: &str, raw: &str) -> Result<u64, FilterError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| FilterError::invalid_value(key, err.to_string()))
}

fn parse_predicate<E: Entity>(key: &str, raw: &str) -> Result<Option<Predicate>, FilterError> {
    let (name, operator) = key
        .split_once(KEY_SEPARATOR)
        .unwrap_or((key, Operator::Eq.as_str()));

    let Some(column) = E::column(name) else {
        debug!(table = E::TABLE, key, "skipping filter on unknown column");
        return Ok(None);
    };
    let Ok(operator) = operator.parse::<Operator>() else {
        debug!(table = E::TABLE, key, "skipping filter with unknown operator");
        return Ok(None);
    };

    let coerce = |item: &str| {
        Value::parse(column.ty, item).map_err(|reason| FilterError::invalid_value(key, reason))
    };

    let operand = match operator {
        Operator::In => Operand::List(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(coerce)
                .collect::<Result<_, _>>()?,
        ),
        Operator::Like | Operator::ILike => substring_pattern(raw),
        _ => Operand::Single(coerce(raw)?),
    };

    Ok(Some(Predicate {
        column,
        operator,
        operand,
    }))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::entities::Document;
    use crate::domain::schema::ColumnType;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ticket {
        id: Option<i64>,
        order: i64,
        limit: Option<String>,
    }

    impl Entity for Ticket {
        const TABLE: &'static str = "tickets";
        const CACHEABLE: bool = false;
        const COLUMNS: &'static [ColumnDef] = &[
            ColumnDef::new("id", ColumnType::Int),
            ColumnDef::new("order", ColumnType::Int),
            ColumnDef::new("limit", ColumnType::Text),
        ];

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }

        fn touch(&mut self, _now: OffsetDateTime) {}
    }

    fn row(id: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.set("id", id);
        row.set("name", name);
        row
    }

    fn params<'a>(
        pairs: &'a [(&'a str, Option<&'a str>)],
    ) -> impl Iterator<Item = (&'a str, Option<&'a str>)> {
        pairs.iter().copied()
    }

    #[test]
    fn in_operator_splits_and_trims() {
        let query = Query::<Document>::from_params(params(&[("id__in", Some("1, 2,3"))]))
            .expect("valid filter");
        let matched: Vec<i64> = (0..6)
            .filter(|id| query.spec().matches(&row(*id, "x")))
            .collect();
        assert_eq!(matched, vec![1, 2, 3]);
    }

    #[test]
    fn like_is_case_sensitive_and_ilike_is_not() {
        let like = Query::<Document>::from_params(params(&[("name__like", Some("abc"))]))
            .expect("valid filter");
        let ilike = Query::<Document>::from_params(params(&[("name__ilike", Some("abc"))]))
            .expect("valid filter");

        assert!(like.spec().matches(&row(1, "xxabcxx")));
        assert!(!like.spec().matches(&row(1, "xxABCxx")));
        assert!(ilike.spec().matches(&row(1, "xxABCxx")));
        assert!(!ilike.spec().matches(&row(1, "xxabxcx")));
    }

    #[test]
    fn none_values_emit_no_predicate() {
        let query = Query::<Document>::from_params(params(&[
            ("name__eq", None),
            ("collection_id", Some("4")),
        ]))
        .expect("valid filter");
        assert_eq!(query.spec().predicates.len(), 1);
        assert_eq!(query.spec().predicates[0].operator, Operator::Eq);
        assert_eq!(
            query.spec().predicates[0].operand,
            Operand::Single(Value::Int(4))
        );
    }

    #[test]
    fn reserved_keys_never_become_predicates() {
        let query = Query::<Ticket>::from_params(params(&[
            ("order_by", Some("id")),
            ("order", Some("asc")),
            ("offset", Some("0")),
            ("limit", Some("10")),
            ("order__eq", Some("3")),
        ]))
        .expect("valid filter");

        let spec = query.spec();
        assert_eq!(spec.predicates.len(), 1);
        assert_eq!(spec.predicates[0].column.name, "order");
        assert_eq!(spec.offset, Some(0));
        assert_eq!(spec.limit, Some(10));
        assert_eq!(
            spec.order,
            Some(OrderBy {
                column: ColumnDef::new("id", ColumnType::Int),
                direction: Direction::Asc,
            })
        );
    }

    #[test]
    fn unrecognized_order_yields_no_ordering() {
        for order in [Some("rand"), Some("ASC"), None] {
            let query = Query::<Document>::from_params(params(&[
                ("order_by", Some("name")),
                ("order", order),
            ]))
            .expect("valid filter");
            assert_eq!(query.spec().order, None);
        }

        let unknown_column = Query::<Document>::from_params(params(&[
            ("order_by", Some("nope")),
            ("order", Some("desc")),
        ]))
        .expect("valid filter");
        assert_eq!(unknown_column.spec().order, None);
    }

    #[test]
    fn unknown_columns_and_operators_are_skipped() {
        let query = Query::<Document>::from_params(params(&[
            ("page", Some("2")),
            ("name__startswith", Some("a")),
            ("name__like", Some("a")),
        ]))
        .expect("valid filter");
        assert_eq!(query.spec().predicates.len(), 1);
    }

    #[test]
    fn uncoercible_values_are_rejected() {
        let err = Query::<Document>::from_params(params(&[("collection_id__ge", Some("many"))]))
            .expect_err("non-integer value");
        assert!(matches!(err, FilterError::InvalidValue { key, .. } if key == "collection_id__ge"));

        let err = Query::<Document>::from_params(params(&[("limit", Some("-1"))]))
            .expect_err("negative limit");
        assert!(matches!(err, FilterError::InvalidValue { key, .. } if key == "limit"));
    }

    #[test]
    fn typed_builder_matches_string_form() {
        let typed = Query::<Document>::all()
            .filter(Document::COLLECTION_ID.eq(4_i64))
            .filter(Document::NAME.ilike("Report"))
            .order_by(Document::ID, Direction::Desc)
            .limit(5);
        let parsed = Query::<Document>::from_params(params(&[
            ("collection_id__eq", Some("4")),
            ("name__ilike", Some("Report")),
            ("order_by", Some("id")),
            ("order", Some("desc")),
            ("limit", Some("5")),
        ]))
        .expect("valid filter");
        assert_eq!(typed.spec(), parsed.spec());
    }

    #[test]
    fn null_never_matches_comparisons() {
        let predicate = Document::SUMMARY.ne("x").into_predicate();
        let mut stored = Row::new();
        stored.set("summary", Value::Null);
        assert!(!predicate.matches(&stored));
    }

    #[test]
    fn like_patterns_handle_wildcards_and_escapes() {
        assert!(like_match("report.pdf", "%.pdf", false));
        assert!(like_match("a_b", "a\\_b", false));
        assert!(!like_match("axb", "a\\_b", false));
        assert!(like_match("abc", "a_c", false));
        assert!(like_match("aaab", "%a%b", false));
        assert!(!like_match("abc", "%d%", false));
        assert!(like_match("", "%", false));
    }
}
