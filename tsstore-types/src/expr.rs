//! Minimal expression AST satisfying the §6.5 "Expression interface (consumed)".
//!
//! Full query-expression parsing and evaluation is explicitly out of scope for
//! the Store (spec §1): callers hand the Store an already-parsed [`Expr`] tree,
//! and the Store only ever rewrites, reduces, or inspects it well enough to
//! split it into a measurement-expr/filter-expr pair (§4.4.2/§4.4.3) or pull a
//! time range out of a delete condition (§4.3.5). This is not a query engine.

use std::fmt;

pub const MIN_TIME: i64 = i64::MIN;
pub const MAX_TIME: i64 = i64::MAX;

/// A literal value appearing on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Str(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// An expression tree. Only as rich as the operations in §4.4 and §4.3.5
/// actually require: conjunctions/disjunctions of binary comparisons against a
/// named reference (a tag key, field key, or the reserved `_name`/`time`
/// references).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A tag key, field key, or reserved name (`_name`, `time`) reference.
    Reference(String),
    Literal(Literal),
    BinaryExpr {
        lhs: Box<Expr>,
        op: BinaryOp,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Paren(Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Reference(name) => write!(f, "{name}"),
            Expr::Literal(Literal::Integer(v)) => write!(f, "{v}"),
            Expr::Literal(Literal::Float(v)) => write!(f, "{v}"),
            Expr::Literal(Literal::Str(v)) => write!(f, "'{v}'"),
            Expr::Literal(Literal::Boolean(v)) => write!(f, "{v}"),
            Expr::BinaryExpr { lhs, op, rhs } => {
                let op = match op {
                    BinaryOp::Eq => "=",
                    BinaryOp::NotEq => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::LtEq => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::GtEq => ">=",
                };
                write!(f, "{lhs} {op} {rhs}")
            }
            Expr::And(lhs, rhs) => write!(f, "{lhs} AND {rhs}"),
            Expr::Or(lhs, rhs) => write!(f, "{lhs} OR {rhs}"),
            Expr::Paren(e) => write!(f, "({e})"),
        }
    }
}

/// `_name` is the reserved reference naming the measurement in a condition.
pub const MEASUREMENT_NAME_REF: &str = "_name";
/// `time` is the reserved reference naming the timestamp in a condition.
pub const TIME_REF: &str = "time";

/// True for any reference beginning with `_` — the "system name" reservation
/// used to separate measurement/time predicates from ordinary tag filters.
pub fn is_system_name(name: &str) -> bool {
    name.starts_with('_')
}

/// Deep-clones an expression tree. `Expr` already derives `Clone`; this exists
/// to give the §6.5 `CloneExpr` operation a named call site independent of
/// `Expr::clone`, the way the spec's external interface lists it as a
/// standalone capability.
pub fn clone_expr(expr: &Expr) -> Expr {
    expr.clone()
}

/// Applies `f` to every node, bottom-up; if `f` returns `Some(replacement)` for
/// a node, the replacement is substituted, otherwise the (recursively
/// rewritten) node itself is kept.
pub fn rewrite_expr(expr: &Expr, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Expr {
    let rewritten = match expr {
        Expr::BinaryExpr { lhs, op, rhs } => Expr::BinaryExpr {
            lhs: Box::new(rewrite_expr(lhs, f)),
            op: *op,
            rhs: Box::new(rewrite_expr(rhs, f)),
        },
        Expr::And(lhs, rhs) => Expr::And(Box::new(rewrite_expr(lhs, f)), Box::new(rewrite_expr(rhs, f))),
        Expr::Or(lhs, rhs) => Expr::Or(Box::new(rewrite_expr(lhs, f)), Box::new(rewrite_expr(rhs, f))),
        Expr::Paren(e) => Expr::Paren(Box::new(rewrite_expr(e, f))),
        Expr::Reference(_) | Expr::Literal(_) => expr.clone(),
    };
    f(&rewritten).unwrap_or(rewritten)
}

/// Simplifies boolean-literal short circuits introduced by rewriting, e.g.
/// `true AND x` -> `x`, `x OR true` -> `true`, `(x)` -> `x`. Not a general
/// constant folder — only what `reduce`'s callers in §4.4 need after a
/// conjunct has been dropped during measurement-expr/filter-expr extraction.
pub fn reduce(expr: &Expr) -> Expr {
    match expr {
        Expr::Paren(inner) => reduce(inner),
        Expr::And(lhs, rhs) => {
            let lhs = reduce(lhs);
            let rhs = reduce(rhs);
            match (&lhs, &rhs) {
                (Expr::Literal(Literal::Boolean(true)), _) => rhs,
                (_, Expr::Literal(Literal::Boolean(true))) => lhs,
                (Expr::Literal(Literal::Boolean(false)), _) | (_, Expr::Literal(Literal::Boolean(false))) => {
                    Expr::Literal(Literal::Boolean(false))
                }
                _ => Expr::And(Box::new(lhs), Box::new(rhs)),
            }
        }
        Expr::Or(lhs, rhs) => {
            let lhs = reduce(lhs);
            let rhs = reduce(rhs);
            match (&lhs, &rhs) {
                (Expr::Literal(Literal::Boolean(true)), _) | (_, Expr::Literal(Literal::Boolean(true))) => {
                    Expr::Literal(Literal::Boolean(true))
                }
                (Expr::Literal(Literal::Boolean(false)), _) => rhs,
                (_, Expr::Literal(Literal::Boolean(false))) => lhs,
                _ => Expr::Or(Box::new(lhs), Box::new(rhs)),
            }
        }
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub min: i64,
    pub max: i64,
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange { min: MIN_TIME, max: MAX_TIME }
    }
}

/// Splits a condition into "everything except `time` comparisons" and the
/// `TimeRange` those comparisons describe, defaulting to `[MinTime, MaxTime]`
/// when the condition has no time bounds at all (§4.3.5).
///
/// Walks the conjunction (AND) tree only: a `time` bound inside an `OR` branch
/// cannot be hoisted into a single range without changing the meaning of the
/// predicate, so such conditions are conservatively left with the full range.
pub fn condition_expr(cond: Option<&Expr>) -> (Option<Expr>, TimeRange) {
    let Some(cond) = cond else {
        return (None, TimeRange::default());
    };
    let mut range = TimeRange::default();
    let mut saw_or_with_time = false;
    let simplified = extract_time_bounds(cond, &mut range, &mut saw_or_with_time);
    if saw_or_with_time {
        return (Some(cond.clone()), TimeRange::default());
    }
    let simplified = reduce(&simplified);
    match simplified {
        Expr::Literal(Literal::Boolean(true)) => (None, range),
        other => (Some(other), range),
    }
}

fn extract_time_bounds(expr: &Expr, range: &mut TimeRange, saw_or_with_time: &mut bool) -> Expr {
    match expr {
        Expr::And(lhs, rhs) => {
            let lhs = extract_time_bounds(lhs, range, saw_or_with_time);
            let rhs = extract_time_bounds(rhs, range, saw_or_with_time);
            Expr::And(Box::new(lhs), Box::new(rhs))
        }
        Expr::Paren(inner) => extract_time_bounds(inner, range, saw_or_with_time),
        Expr::Or(lhs, rhs) => {
            if mentions_time(lhs) || mentions_time(rhs) {
                *saw_or_with_time = true;
            }
            expr.clone()
        }
        Expr::BinaryExpr { lhs, op, rhs } => {
            if let (Expr::Reference(name), Expr::Literal(Literal::Integer(value))) = (lhs.as_ref(), rhs.as_ref()) {
                if name == TIME_REF {
                    match op {
                        BinaryOp::Gt => range.min = value.saturating_add(1),
                        BinaryOp::GtEq => range.min = *value,
                        BinaryOp::Lt => range.max = value.saturating_sub(1),
                        BinaryOp::LtEq => range.max = *value,
                        BinaryOp::Eq => {
                            range.min = *value;
                            range.max = *value;
                        }
                        BinaryOp::NotEq => return expr.clone(),
                    }
                    return Expr::Literal(Literal::Boolean(true));
                }
            }
            expr.clone()
        }
        other => other.clone(),
    }
}

fn mentions_time(expr: &Expr) -> bool {
    match expr {
        Expr::Reference(name) => name == TIME_REF,
        Expr::Literal(_) => false,
        Expr::BinaryExpr { lhs, rhs, .. } => mentions_time(lhs) || mentions_time(rhs),
        Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => mentions_time(lhs) || mentions_time(rhs),
        Expr::Paren(inner) => mentions_time(inner),
    }
}

/// Walks the conjunction tree of `expr` and keeps only the binary comparisons
/// whose left-hand reference satisfies `keep`; other conjuncts are dropped
/// (replaced with the boolean identity for AND). Returns `None` if nothing
/// survived. This is the building block for the §4.4.2/§4.4.3
/// measurement-expr/filter-expr split.
pub fn filter_conjuncts(expr: &Expr, keep: &dyn Fn(&str) -> bool) -> Option<Expr> {
    fn walk(expr: &Expr, keep: &dyn Fn(&str) -> bool) -> Expr {
        match expr {
            Expr::And(lhs, rhs) => Expr::And(Box::new(walk(lhs, keep)), Box::new(walk(rhs, keep))),
            Expr::Paren(inner) => walk(inner, keep),
            Expr::BinaryExpr { lhs, .. } => {
                if let Expr::Reference(name) = lhs.as_ref() {
                    if keep(name) {
                        return expr.clone();
                    }
                }
                Expr::Literal(Literal::Boolean(true))
            }
            // Anything else (OR trees, bare references) is kept verbatim:
            // dropping half of a disjunction would change its meaning.
            other => other.clone(),
        }
    }
    match reduce(&walk(expr, keep)) {
        Expr::Literal(Literal::Boolean(true)) => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq_ref(name: &str, value: i64) -> Expr {
        Expr::BinaryExpr {
            lhs: Box::new(Expr::Reference(name.to_string())),
            op: BinaryOp::Eq,
            rhs: Box::new(Expr::Literal(Literal::Integer(value))),
        }
    }

    #[test]
    fn filter_conjuncts_keeps_only_matching_references() {
        let expr = Expr::And(
            Box::new(eq_ref(MEASUREMENT_NAME_REF, 0)),
            Box::new(eq_ref("host", 1)),
        );
        let measurement_expr = filter_conjuncts(&expr, &|name| name == MEASUREMENT_NAME_REF).unwrap();
        assert_eq!(measurement_expr, eq_ref(MEASUREMENT_NAME_REF, 0));

        let filter_expr = filter_conjuncts(&expr, &|name| !is_system_name(name)).unwrap();
        assert_eq!(filter_expr, eq_ref("host", 1));
    }

    #[test]
    fn condition_expr_extracts_time_range_and_strips_it() {
        let expr = Expr::And(
            Box::new(Expr::BinaryExpr {
                lhs: Box::new(Expr::Reference(TIME_REF.to_string())),
                op: BinaryOp::GtEq,
                rhs: Box::new(Expr::Literal(Literal::Integer(100))),
            }),
            Box::new(eq_ref("host", 1)),
        );
        let (simplified, range) = condition_expr(Some(&expr));
        assert_eq!(range, TimeRange { min: 100, max: MAX_TIME });
        assert_eq!(simplified, Some(eq_ref("host", 1)));
    }

    #[test]
    fn condition_expr_defaults_full_range_when_absent() {
        let (simplified, range) = condition_expr(None);
        assert_eq!(simplified, None);
        assert_eq!(range, TimeRange::default());
    }
}
