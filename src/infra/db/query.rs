//! SQL rendering of [`QuerySpec`]s onto a `QueryBuilder`.
//!
//! Identifiers come from static entity schemas and are always quoted;
//! every value is a bound parameter.

use sqlx::{Postgres, QueryBuilder};

use crate::application::filter::{Operand, Operator, Predicate, QuerySpec};
use crate::domain::schema::Value;

pub(super) fn push_ident(qb: &mut QueryBuilder<'_, Postgres>, name: &str) {
    qb.push('"');
    qb.push(name.replace('"', "\"\""));
    qb.push('"');
}

pub(super) fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value.clone() {
        Value::Null => qb.push("NULL"),
        Value::Bool(value) => qb.push_bind(value),
        Value::Int(value) => qb.push_bind(value),
        Value::Float(value) => qb.push_bind(value),
        Value::Text(value) => qb.push_bind(value),
        Value::Timestamp(value) => qb.push_bind(value),
    };
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match (predicate.operator, &predicate.operand) {
        (Operator::In, Operand::List(values)) if values.is_empty() => {
            qb.push("FALSE");
        }
        (Operator::In, Operand::List(values)) => {
            push_ident(qb, predicate.column.name);
            qb.push(" IN (");
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    qb.push(", ");
                }
                push_value(qb, value);
            }
            qb.push(")");
        }
        (operator @ (Operator::Like | Operator::ILike), Operand::Pattern(pattern)) => {
            qb.push("CAST(");
            push_ident(qb, predicate.column.name);
            qb.push(" AS TEXT) ");
            qb.push(operator.sql());
            qb.push(" ");
            qb.push_bind(pattern.clone());
        }
        (operator, Operand::Single(value)) => {
            push_ident(qb, predicate.column.name);
            qb.push(" ");
            qb.push(operator.sql());
            qb.push(" ");
            push_value(qb, value);
        }
        // Operator and operand disagree; such a predicate matches nothing.
        _ => {
            qb.push("FALSE");
        }
    }
}

/// `WHERE` clause for the predicates and subquery restriction of `spec`.
pub(super) fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec) {
    let mut clauses = 0;
    let mut next_clause = |qb: &mut QueryBuilder<'_, Postgres>| {
        qb.push(if clauses == 0 { " WHERE " } else { " AND " });
        clauses += 1;
    };

    for predicate in &spec.predicates {
        next_clause(qb);
        push_predicate(qb, predicate);
    }

    if let Some(subquery) = &spec.subquery {
        next_clause(qb);
        push_ident(qb, "id");
        qb.push(" IN (SELECT ");
        push_ident(qb, subquery.column.name);
        qb.push(" FROM ");
        push_ident(qb, subquery.table);
        for (index, predicate) in subquery.predicates.iter().enumerate() {
            qb.push(if index == 0 { " WHERE " } else { " AND " });
            push_predicate(qb, predicate);
        }
        qb.push(")");
    }
}

/// `ORDER BY`, `LIMIT` and `OFFSET` for `spec`.
pub(super) fn push_paging(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec) {
    if let Some(order) = spec.order {
        qb.push(" ORDER BY ");
        push_ident(qb, order.column.name);
        qb.push(" ");
        qb.push(order.direction.sql());
    }
    if let Some(limit) = spec.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(offset) = spec.offset {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
}
