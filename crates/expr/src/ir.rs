//! Expression IR.
//!
//! Expressions are plain data: the query builder assembles them, the
//! compiler lowers them to closures. `PartialEq` is derived so the query
//! compiler can match select items against group-by expressions.

use rill_core::Value;

/// Sort direction for comparators and ordered windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// An expression over a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A constant value.
    Literal(Value),
    /// A field path into the row (`["user", "id"]` reads `row.user.id`).
    Field(Vec<String>),
    /// A named operator applied to argument expressions.
    Func { name: String, args: Vec<Expr> },
    /// A named aggregate over an optional argument expression. Only valid
    /// in select items of grouped queries.
    Aggregate {
        name: String,
        arg: Option<Box<Expr>>,
    },
}

impl Expr {
    /// A literal value.
    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    /// A field reference. Dots split the name into a path, so
    /// `Expr::field("u.id")` reads the `id` field of the `u` object.
    pub fn field(name: &str) -> Expr {
        Expr::Field(name.split('.').map(str::to_string).collect())
    }

    /// A field reference from explicit path segments.
    pub fn path<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Expr {
        Expr::Field(segments.into_iter().map(Into::into).collect())
    }

    /// A named operator application.
    pub fn func<S: Into<String>>(name: S, args: Vec<Expr>) -> Expr {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    // ----- comparison -------------------------------------------------

    pub fn eq(self, other: Expr) -> Expr {
        Expr::func("eq", vec![self, other])
    }

    pub fn ne(self, other: Expr) -> Expr {
        Expr::func("ne", vec![self, other])
    }

    pub fn gt(self, other: Expr) -> Expr {
        Expr::func("gt", vec![self, other])
    }

    pub fn gte(self, other: Expr) -> Expr {
        Expr::func("gte", vec![self, other])
    }

    pub fn lt(self, other: Expr) -> Expr {
        Expr::func("lt", vec![self, other])
    }

    pub fn lte(self, other: Expr) -> Expr {
        Expr::func("lte", vec![self, other])
    }

    // ----- boolean ----------------------------------------------------

    pub fn and(self, other: Expr) -> Expr {
        Expr::func("and", vec![self, other])
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::func("or", vec![self, other])
    }

    pub fn not(self) -> Expr {
        Expr::func("not", vec![self])
    }

    pub fn is_null(self) -> Expr {
        Expr::func("isNull", vec![self])
    }

    pub fn is_not_null(self) -> Expr {
        Expr::func("isNotNull", vec![self])
    }

    /// List membership with three-valued semantics.
    pub fn in_list(self, items: Vec<Expr>) -> Expr {
        let mut args = vec![self];
        args.extend(items);
        Expr::func("in", args)
    }

    // ----- arithmetic ---------------------------------------------------

    pub fn add(self, other: Expr) -> Expr {
        Expr::func("add", vec![self, other])
    }

    pub fn sub(self, other: Expr) -> Expr {
        Expr::func("sub", vec![self, other])
    }

    pub fn mul(self, other: Expr) -> Expr {
        Expr::func("mul", vec![self, other])
    }

    pub fn div(self, other: Expr) -> Expr {
        Expr::func("div", vec![self, other])
    }

    // ----- strings ------------------------------------------------------

    /// SQL LIKE against a literal pattern.
    pub fn like(self, pattern: &str) -> Expr {
        Expr::func("like", vec![self, Expr::lit(pattern)])
    }

    /// Case-insensitive LIKE against a literal pattern.
    pub fn ilike(self, pattern: &str) -> Expr {
        Expr::func("ilike", vec![self, Expr::lit(pattern)])
    }

    pub fn upper(self) -> Expr {
        Expr::func("upper", vec![self])
    }

    pub fn lower(self) -> Expr {
        Expr::func("lower", vec![self])
    }

    pub fn concat(parts: Vec<Expr>) -> Expr {
        Expr::func("concat", parts)
    }

    pub fn coalesce(options: Vec<Expr>) -> Expr {
        Expr::func("coalesce", options)
    }

    // ----- aggregates -----------------------------------------------------

    pub fn count() -> Expr {
        Expr::Aggregate {
            name: "count".into(),
            arg: None,
        }
    }

    pub fn sum(arg: Expr) -> Expr {
        Expr::aggregate("sum", arg)
    }

    pub fn avg(arg: Expr) -> Expr {
        Expr::aggregate("avg", arg)
    }

    pub fn min(arg: Expr) -> Expr {
        Expr::aggregate("min", arg)
    }

    pub fn max(arg: Expr) -> Expr {
        Expr::aggregate("max", arg)
    }

    pub fn min_str(arg: Expr) -> Expr {
        Expr::aggregate("minStr", arg)
    }

    pub fn max_str(arg: Expr) -> Expr {
        Expr::aggregate("maxStr", arg)
    }

    pub fn collect(arg: Expr) -> Expr {
        Expr::aggregate("collect", arg)
    }

    /// A named aggregate application (for registered aggregates).
    pub fn aggregate<S: Into<String>>(name: S, arg: Expr) -> Expr {
        Expr::Aggregate {
            name: name.into(),
            arg: Some(Box::new(arg)),
        }
    }

    // ----- inspection -----------------------------------------------------

    /// Returns true if this node is an aggregate application.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Aggregate { .. })
    }

    /// Returns true if any node in this expression is an aggregate.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Func { args, .. } => args.iter().any(Expr::contains_aggregate),
            Expr::Literal(_) | Expr::Field(_) => false,
        }
    }

    /// Collects every field path referenced by this expression.
    pub fn field_paths(&self) -> Vec<&[String]> {
        fn walk<'a>(expr: &'a Expr, out: &mut Vec<&'a [String]>) {
            match expr {
                Expr::Field(path) => out.push(path),
                Expr::Func { args, .. } => args.iter().for_each(|a| walk(a, out)),
                Expr::Aggregate { arg: Some(arg), .. } => walk(arg, out),
                _ => {}
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}
