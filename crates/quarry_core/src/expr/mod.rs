//! Scalar expressions.
//!
//! Expressions are immutable trees, compared structurally. They never carry
//! schema information, types are derived against an input schema during
//! resolution.
use std::fmt;

use crate::schema::DataType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Neg,
    Not,
    /// Sort ascending, only meaningful in ORDER BY.
    Asc,
    /// Sort descending, only meaningful in ORDER BY.
    Desc,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neg => write!(f, "-"),
            Self::Not => write!(f, "NOT"),
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Lt,
    LtEq,
    Eq,
    NotEq,
    GtEq,
    Gt,
    Is,
    IsNot,
    Like,
    NotLike,
    RLike,
    NotRLike,
    Regexp,
    In,
    Plus,
    Minus,
    Multiply,
    Divide,
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        !self.is_arithmetic() && !self.is_logical()
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Plus | Self::Minus | Self::Multiply | Self::Divide
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// Operators matching a string against a pattern.
    pub fn is_pattern_match(&self) -> bool {
        matches!(
            self,
            Self::Like | Self::NotLike | Self::RLike | Self::NotRLike | Self::Regexp
        )
    }

    /// Look up an operator by its SQL spelling.
    pub fn from_symbol(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "<" => Self::Lt,
            "<=" => Self::LtEq,
            "=" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            ">=" => Self::GtEq,
            ">" => Self::Gt,
            "is" => Self::Is,
            "is not" => Self::IsNot,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            "rlike" => Self::RLike,
            "not rlike" => Self::NotRLike,
            "regexp" => Self::Regexp,
            "in" => Self::In,
            "+" => Self::Plus,
            "-" => Self::Minus,
            "*" => Self::Multiply,
            "/" => Self::Divide,
            "and" => Self::And,
            "or" => Self::Or,
            _ => return None,
        })
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::GtEq => ">=",
            Self::Gt => ">",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::RLike => "RLIKE",
            Self::NotRLike => "NOT RLIKE",
            Self::Regexp => "REGEXP",
            Self::In => "IN",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::And => "AND",
            Self::Or => "OR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Reference to a field by name or `qualifier.name`.
    Var(String),
    /// A NULL, boolean, number or string literal.
    Const(Value),
    /// Positional query parameter, bound at execution.
    Param(usize),
    Unary {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    /// `expr[key]`, indexes a REPEATED value by position or a RECORD value by
    /// field name.
    ItemGet {
        expr: Box<Expression>,
        key: Value,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
    },
    Tuple(Vec<Expression>),
    Function {
        name: String,
        args: Vec<Expression>,
    },
    Rename {
        alias: String,
        expr: Box<Expression>,
    },
    /// `*` or `table.*`.
    SelectAll(Option<String>),
    CaseWhen {
        /// WHEN <condition> THEN <result>
        conditions: Vec<(Expression, Expression)>,
        default: Option<Box<Expression>>,
    },
    Cast {
        expr: Box<Expression>,
        datatype: DataType,
    },
}

impl Expression {
    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, expr: Expression) -> Self {
        Expression::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    /// Fold expressions into a left-deep conjunction, `None` if empty.
    pub fn and_all(exprs: impl IntoIterator<Item = Expression>) -> Option<Expression> {
        exprs
            .into_iter()
            .reduce(|acc, expr| Expression::binary(BinaryOperator::And, acc, expr))
    }

    pub fn for_each_child<F>(&self, func: &mut F)
    where
        F: FnMut(&Expression),
    {
        match self {
            Self::Var(_) | Self::Const(_) | Self::Param(_) | Self::SelectAll(_) => (),
            Self::Unary { expr, .. }
            | Self::ItemGet { expr, .. }
            | Self::Rename { expr, .. }
            | Self::Cast { expr, .. } => func(expr),
            Self::Binary { left, right, .. } => {
                func(left);
                func(right);
            }
            Self::Between { expr, low, high } => {
                func(expr);
                func(low);
                func(high);
            }
            Self::Tuple(exprs) | Self::Function { args: exprs, .. } => {
                exprs.iter().for_each(func);
            }
            Self::CaseWhen {
                conditions,
                default,
            } => {
                for (cond, result) in conditions {
                    func(cond);
                    func(result);
                }
                if let Some(default) = default {
                    func(default);
                }
            }
        }
    }

    /// Check if this expression or any of its children satisfy `pred`.
    pub fn any<F>(&self, pred: &F) -> bool
    where
        F: Fn(&Expression) -> bool,
    {
        if pred(self) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| {
            if !found {
                found = child.any(pred);
            }
        });
        found
    }

    /// Strip a top level rename.
    pub fn unaliased(&self) -> &Expression {
        match self {
            Self::Rename { expr, .. } => expr.unaliased(),
            other => other,
        }
    }

    /// Rewrite every field reference with `f`, leaving the rest of the tree
    /// as is.
    pub fn map_vars<F>(self, f: &F) -> Expression
    where
        F: Fn(String) -> String,
    {
        let boxed = |expr: Box<Expression>| Box::new(expr.map_vars(f));
        let list = |exprs: Vec<Expression>| -> Vec<Expression> {
            exprs.into_iter().map(|e| e.map_vars(f)).collect()
        };

        match self {
            Self::Var(path) => Self::Var(f(path)),
            Self::Const(_) | Self::Param(_) | Self::SelectAll(_) => self,
            Self::Unary { op, expr } => Self::Unary {
                op,
                expr: boxed(expr),
            },
            Self::ItemGet { expr, key } => Self::ItemGet {
                expr: boxed(expr),
                key,
            },
            Self::Binary { op, left, right } => Self::Binary {
                op,
                left: boxed(left),
                right: boxed(right),
            },
            Self::Between { expr, low, high } => Self::Between {
                expr: boxed(expr),
                low: boxed(low),
                high: boxed(high),
            },
            Self::Tuple(exprs) => Self::Tuple(list(exprs)),
            Self::Function { name, args } => Self::Function {
                name,
                args: list(args),
            },
            Self::Rename { alias, expr } => Self::Rename {
                alias,
                expr: boxed(expr),
            },
            Self::CaseWhen {
                conditions,
                default,
            } => Self::CaseWhen {
                conditions: conditions
                    .into_iter()
                    .map(|(cond, result)| (cond.map_vars(f), result.map_vars(f)))
                    .collect(),
                default: default.map(boxed),
            },
            Self::Cast { expr, datatype } => Self::Cast {
                expr: boxed(expr),
                datatype,
            },
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, exprs: &[Expression]) -> fmt::Result {
            for (idx, expr) in exprs.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{expr}")?;
            }
            Ok(())
        }

        match self {
            Self::Var(path) => write!(f, "{path}"),
            Self::Const(val) => write!(f, "{val}"),
            Self::Param(idx) => write!(f, "?{idx}"),
            Self::Unary { op, expr } => match op {
                UnaryOperator::Neg => write!(f, "-{expr}"),
                UnaryOperator::Not => write!(f, "NOT {expr}"),
                UnaryOperator::Asc | UnaryOperator::Desc => write!(f, "{expr} {op}"),
            },
            Self::ItemGet { expr, key } => write!(f, "{expr}[{key}]"),
            Self::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Self::Between { expr, low, high } => write!(f, "{expr} BETWEEN {low} AND {high}"),
            Self::Tuple(exprs) => {
                write!(f, "(")?;
                list(f, exprs)?;
                write!(f, ")")
            }
            Self::Function { name, args } => {
                write!(f, "{name}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            Self::Rename { alias, expr } => write!(f, "{expr} AS {alias}"),
            Self::SelectAll(Some(table)) => write!(f, "{table}.*"),
            Self::SelectAll(None) => write!(f, "*"),
            Self::CaseWhen {
                conditions,
                default,
            } => {
                write!(f, "CASE")?;
                for (cond, result) in conditions {
                    write!(f, " WHEN {cond} THEN {result}")?;
                }
                if let Some(default) = default {
                    write!(f, " ELSE {default}")?;
                }
                write!(f, " END")
            }
            Self::Cast { expr, datatype } => write!(f, "CAST({expr} AS {datatype})"),
        }
    }
}

pub fn col(path: impl Into<String>) -> Expression {
    Expression::Var(path.into())
}

pub fn lit(value: impl Into<Value>) -> Expression {
    Expression::Const(value.into())
}

pub fn null() -> Expression {
    Expression::Const(Value::Null)
}

pub fn param(idx: usize) -> Expression {
    Expression::Param(idx)
}

pub fn func(name: impl Into<String>, args: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Function {
        name: name.into(),
        args: args.into_iter().collect(),
    }
}

pub fn rename(alias: impl Into<String>, expr: Expression) -> Expression {
    Expression::Rename {
        alias: alias.into(),
        expr: Box::new(expr),
    }
}

pub fn select_all() -> Expression {
    Expression::SelectAll(None)
}

pub fn select_all_from(table: impl Into<String>) -> Expression {
    Expression::SelectAll(Some(table.into()))
}

pub fn asc(expr: Expression) -> Expression {
    Expression::unary(UnaryOperator::Asc, expr)
}

pub fn desc(expr: Expression) -> Expression {
    Expression::unary(UnaryOperator::Desc, expr)
}

pub fn not(expr: Expression) -> Expression {
    Expression::unary(UnaryOperator::Not, expr)
}

pub fn neg(expr: Expression) -> Expression {
    Expression::unary(UnaryOperator::Neg, expr)
}

pub fn and(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::And, left, right)
}

pub fn or(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Or, left, right)
}

pub fn eq(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Eq, left, right)
}

pub fn not_eq(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::NotEq, left, right)
}

pub fn lt(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Lt, left, right)
}

pub fn gt(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Gt, left, right)
}

pub fn gt_eq(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::GtEq, left, right)
}

pub fn lt_eq(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::LtEq, left, right)
}

pub fn plus(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Plus, left, right)
}

pub fn minus(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Minus, left, right)
}

pub fn mul(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Multiply, left, right)
}

pub fn div(left: Expression, right: Expression) -> Expression {
    Expression::binary(BinaryOperator::Divide, left, right)
}

pub fn between(expr: Expression, low: Expression, high: Expression) -> Expression {
    Expression::Between {
        expr: Box::new(expr),
        low: Box::new(low),
        high: Box::new(high),
    }
}

pub fn tuple(exprs: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Tuple(exprs.into_iter().collect())
}

pub fn in_list(expr: Expression, list: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::binary(BinaryOperator::In, expr, tuple(list))
}

pub fn cast(expr: Expression, datatype: DataType) -> Expression {
    Expression::Cast {
        expr: Box::new(expr),
        datatype,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_all_left_deep() {
        let expr = Expression::and_all([col("a"), col("b"), col("c")]).unwrap();
        assert_eq!(and(and(col("a"), col("b")), col("c")), expr);
        assert_eq!(None, Expression::and_all([]));
    }

    #[test]
    fn structural_equality() {
        assert_eq!(eq(col("x"), lit(1)), eq(col("x"), lit(1)));
        assert_ne!(eq(col("x"), lit(1)), eq(lit(1), col("x")));
    }

    #[test]
    fn any_finds_nested_function() {
        let expr = rename("c", plus(col("x"), func("count", [])));
        assert!(expr.any(&|e| matches!(e, Expression::Function { .. })));
        assert!(!col("x").any(&|e| matches!(e, Expression::Function { .. })));
    }

    #[test]
    fn map_vars_rewrites_nested_paths() {
        let expr = and(eq(col("d.path"), lit("a")), func("lower", [col("d.name")]));
        let stripped = expr.map_vars(&|path| path.trim_start_matches("d.").to_string());
        assert_eq!(and(eq(col("path"), lit("a")), func("lower", [col("name")])), stripped);
    }

    #[test]
    fn display() {
        let expr = and(
            eq(col("e.manager_id"), lit(1234)),
            in_list(col("name"), [lit("Tom"), lit("Sally")]),
        );
        assert_eq!(
            "((e.manager_id = 1234) AND (name IN ('Tom', 'Sally')))",
            expr.to_string()
        );
    }

    #[test]
    fn operator_symbols() {
        assert_eq!(Some(BinaryOperator::IsNot), BinaryOperator::from_symbol("IS NOT"));
        assert_eq!(Some(BinaryOperator::NotEq), BinaryOperator::from_symbol("<>"));
        assert_eq!(None, BinaryOperator::from_symbol("=="));
        assert!(BinaryOperator::Like.is_comparison());
        assert!(!BinaryOperator::Plus.is_comparison());
    }
}
