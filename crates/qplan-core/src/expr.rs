//! # Expression and Operator Tree
//!
//! The planner speaks one tree type, `Expr`, for both scalar predicates and the
//! operator graph it produces. This mirrors how the upstream expression producer
//! hands us a query: the join graph is a tree of `Join` and `AliasTableName`
//! nodes, the WHERE clause is a tree of `Function`, `FetchVariable` and
//! `FetchStatic` nodes, and the finished plan mixes both (a `Filter` node holds
//! a predicate subtree).
//!
//! ## Node Kinds
//!
//! `ExprKind` is a closed tagged union. Each kind has explicit, typed fields:
//! children, the filter kind, index-candidate and join-strategy markup. There is
//! no string-keyed attribute bag, so every consumer matches exhaustively.
//!
//! ## Cost Annotation
//!
//! Every node has an optional `Cost`. The cost model fills it in bottom-up;
//! reading it before that fails with `PlanError::CostNotSet`. `clear_costs`
//! resets a whole subtree. Trees are otherwise treated as immutable values: the
//! planner builds a fresh tree for every candidate plan.

use crate::cost::Cost;
use crate::error::{PlanError, Result};
use crate::range::SelectableRange;
use crate::stats::FactId;
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Qualified table (or alias) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A column of a (possibly aliased) table. Used as the dependency key of
/// predicates and as the cache key of column statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    pub table: TableName,
    pub column: String,
}

impl Variable {
    pub fn new(table: TableName, column: impl Into<String>) -> Self {
        Self {
            table,
            column: column.into(),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Comparison operators understood by the range algebra and the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    /// `IS`: equality that treats NULL as a value.
    Is,
    /// `IS NOT`: inequality that treats NULL as a value.
    IsNot,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// The operator to use when the operands are swapped (`5 < x` → `x > 5`).
    pub fn reverse(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
            other => other,
        }
    }

    /// Equality-class operators (`=`, `is`).
    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Is)
    }

    /// Whether `left.cmp(right) == ord` satisfies `left OP right`.
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq | CompareOp::Is => ord == Ordering::Equal,
            CompareOp::NotEq | CompareOp::IsNot => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::LtEq => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::GtEq => ord != Ordering::Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Is => "IS",
            CompareOp::IsNot => "IS NOT",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Arithmetic operators, folded when both operands are static.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// SQL join types.
///
/// The planner builds `Cartesian`, `Inner` and `OuterLeft` joins. `OuterRight`
/// is accepted in the input graph and normalized to `OuterLeft`; `FullOuter`
/// is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Cartesian,
    Inner,
    OuterLeft,
    OuterRight,
    FullOuter,
}

/// One key of a requested output order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
        }
    }
}

/// An index the execution engine may use to evaluate a filter, a join or a sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexCandidate {
    /// Base table owning the index.
    pub table: TableName,
    /// Alias under which the table appears in the query.
    pub alias: TableName,
    pub index_name: String,
    /// Columns of the index collation, in collation order.
    pub columns: Vec<String>,
    /// Range to probe, when the predicate reduces to one.
    #[serde(default)]
    pub range: Option<SelectableRange>,
}

impl fmt::Display for IndexCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.table, self.index_name, self.columns.join(", "))
    }
}

/// Operator of a `Function` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionOp {
    Compare(CompareOp),
    And,
    Or,
    Not,
    Arith(ArithOp),
    /// `range_set(variable)`: the variable lies in the range. Produced by
    /// simplification; the single argument is the variable.
    RangeSet(SelectableRange),
    /// Any other function, opaque to the planner.
    Call(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub op: FunctionOp,
    #[serde(default)]
    pub args: Vec<Expr>,
}

/// Kind of a `Filter` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Keep rows satisfying the predicate; may be evaluated through an index.
    SingleFilter {
        predicate: Box<Expr>,
        #[serde(default)]
        index: Option<IndexCandidate>,
    },
    /// Order rows. `index` names an index whose collation already provides it.
    Sort {
        order: Vec<SortKey>,
        #[serde(default)]
        index: Option<IndexCandidate>,
    },
    /// A predicate with no table dependency, evaluated once.
    StaticFilter { predicate: Box<Expr> },
    /// Marks a relation of computed expressions.
    ExpressionTable,
    /// Grouping/aggregation stage, opaque to the planner.
    Aggregate {
        #[serde(default)]
        group_by: Vec<Expr>,
    },
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::SingleFilter { .. } => "single_filter",
            FilterKind::Sort { .. } => "sort",
            FilterKind::StaticFilter { .. } => "static_filter",
            FilterKind::ExpressionTable => "expression_table",
            FilterKind::Aggregate { .. } => "aggregate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub kind: FilterKind,
    pub child: Box<Expr>,
}

/// Execution hints attached to a join by the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinStrategy {
    /// Index on the left (outer) relation matching the join predicate.
    #[serde(default)]
    pub left_index: Option<IndexCandidate>,
    /// Index on the right (inner) relation the engine should probe per left row.
    #[serde(default)]
    pub right_index: Option<IndexCandidate>,
    /// Canonical identity of the join predicate for fact statistics.
    #[serde(default)]
    pub fact: Option<FactId>,
}

impl JoinStrategy {
    pub fn use_right_index(&self) -> bool {
        self.right_index.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinNode {
    pub join_type: JoinType,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    #[serde(default)]
    pub filter: Option<Box<Expr>>,
    #[serde(default)]
    pub strategy: JoinStrategy,
}

/// A base relation under an alias. `source` is a `FetchTable` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasNode {
    pub alias: TableName,
    pub source: Box<Expr>,
}

/// The closed set of node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Join(JoinNode),
    Filter(FilterNode),
    Function(FunctionNode),
    FetchVariable(Variable),
    FetchStatic(ScalarValue),
    FetchTable(TableName),
    AliasTableName(AliasNode),
}

/// A node of the expression / operator tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default, skip_deserializing)]
    cost: Option<Cost>,
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr::new(kind)
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, cost: None }
    }

    pub fn variable(var: Variable) -> Self {
        Expr::new(ExprKind::FetchVariable(var))
    }

    /// Shorthand for a `FetchVariable` of `table.column`.
    pub fn column(table: &str, column: &str) -> Self {
        Expr::variable(Variable::new(TableName::new(table), column))
    }

    pub fn literal(value: ScalarValue) -> Self {
        Expr::new(ExprKind::FetchStatic(value))
    }

    pub fn int(value: i64) -> Self {
        Expr::literal(ScalarValue::Int64(value))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::literal(ScalarValue::Bool(value))
    }

    /// A base relation `table` under `alias`.
    pub fn alias(alias: TableName, table: TableName) -> Self {
        Expr::new(ExprKind::AliasTableName(AliasNode {
            alias,
            source: Box::new(Expr::new(ExprKind::FetchTable(table))),
        }))
    }

    pub fn function(op: FunctionOp, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Function(FunctionNode { op, args }))
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::function(FunctionOp::Compare(op), vec![left, right])
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Expr::compare(CompareOp::Eq, left, right)
    }

    /// Conjunction; a single term is returned unwrapped.
    pub fn and(mut terms: Vec<Expr>) -> Self {
        if terms.len() == 1 {
            return terms.remove(0);
        }
        Expr::function(FunctionOp::And, terms)
    }

    /// Disjunction; a single term is returned unwrapped.
    pub fn or(mut terms: Vec<Expr>) -> Self {
        if terms.len() == 1 {
            return terms.remove(0);
        }
        Expr::function(FunctionOp::Or, terms)
    }

    pub fn negate(term: Expr) -> Self {
        Expr::function(FunctionOp::Not, vec![term])
    }

    pub fn range_set(var: Variable, range: SelectableRange) -> Self {
        Expr::function(FunctionOp::RangeSet(range), vec![Expr::variable(var)])
    }

    pub fn join(join_type: JoinType, left: Expr, right: Expr, filter: Option<Expr>) -> Self {
        Expr::new(ExprKind::Join(JoinNode {
            join_type,
            left: Box::new(left),
            right: Box::new(right),
            filter: filter.map(Box::new),
            strategy: JoinStrategy::default(),
        }))
    }

    pub fn filter(kind: FilterKind, child: Expr) -> Self {
        Expr::new(ExprKind::Filter(FilterNode {
            kind,
            child: Box::new(child),
        }))
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Join(_) => "Join",
            ExprKind::Filter(_) => "Filter",
            ExprKind::Function(_) => "Function",
            ExprKind::FetchVariable(_) => "FetchVariable",
            ExprKind::FetchStatic(_) => "FetchStatic",
            ExprKind::FetchTable(_) => "FetchTable",
            ExprKind::AliasTableName(_) => "AliasTableName",
        }
    }

    // -----------------------------------------------------------------------
    // Cost fields
    // -----------------------------------------------------------------------

    pub fn is_cost_set(&self) -> bool {
        self.cost.is_some()
    }

    /// The computed cost of this node. Fails if the cost model has not run.
    pub fn cost(&self) -> Result<Cost> {
        self.cost.ok_or_else(|| PlanError::CostNotSet {
            kind: self.kind_name(),
            node: self.to_string(),
        })
    }

    pub(crate) fn set_cost(&mut self, cost: Cost) {
        self.cost = Some(cost);
    }

    /// Reset the cost of this node and of every node below it.
    pub fn clear_costs(&mut self) {
        self.cost = None;
        for child in self.children_mut() {
            child.clear_costs();
        }
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Join(j) => {
                let mut out = vec![j.left.as_ref(), j.right.as_ref()];
                if let Some(f) = &j.filter {
                    out.push(f.as_ref());
                }
                out
            }
            ExprKind::Filter(f) => vec![f.child.as_ref()],
            ExprKind::Function(func) => func.args.iter().collect(),
            ExprKind::AliasTableName(a) => vec![a.source.as_ref()],
            ExprKind::FetchVariable(_) | ExprKind::FetchStatic(_) | ExprKind::FetchTable(_) => {
                vec![]
            }
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Join(j) => {
                let mut out = vec![j.left.as_mut(), j.right.as_mut()];
                if let Some(f) = &mut j.filter {
                    out.push(f.as_mut());
                }
                out
            }
            ExprKind::Filter(f) => vec![f.child.as_mut()],
            ExprKind::Function(func) => func.args.iter_mut().collect(),
            ExprKind::AliasTableName(a) => vec![a.source.as_mut()],
            ExprKind::FetchVariable(_) | ExprKind::FetchStatic(_) | ExprKind::FetchTable(_) => {
                vec![]
            }
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            ExprKind::FetchVariable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&ScalarValue> {
        match &self.kind {
            ExprKind::FetchStatic(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionNode> {
        match &self.kind {
            ExprKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// `(variable, range)` when this node is `range_set(variable)`.
    pub fn as_range_set(&self) -> Option<(&Variable, &SelectableRange)> {
        match &self.kind {
            ExprKind::Function(FunctionNode {
                op: FunctionOp::RangeSet(range),
                args,
            }) => args.first().and_then(Expr::as_variable).map(|v| (v, range)),
            _ => None,
        }
    }

    /// `(op, left, right)` when this node is a binary comparison.
    pub fn as_comparison(&self) -> Option<(CompareOp, &Expr, &Expr)> {
        match &self.kind {
            ExprKind::Function(FunctionNode {
                op: FunctionOp::Compare(op),
                args,
            }) if args.len() == 2 => Some((*op, &args[0], &args[1])),
            _ => None,
        }
    }

    /// Alias of a bare base relation.
    pub fn as_alias(&self) -> Option<&AliasNode> {
        match &self.kind {
            ExprKind::AliasTableName(a) => Some(a),
            _ => None,
        }
    }

    /// All variables referenced in this subtree.
    pub fn variables(&self) -> Vec<&Variable> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a Variable>) {
        if let ExprKind::FetchVariable(v) = &self.kind {
            out.push(v);
        }
        for child in self.children() {
            child.collect_variables(out);
        }
    }

    /// Tables this expression depends on, via the variables it references.
    pub fn dependencies(&self) -> BTreeSet<TableName> {
        self.variables().into_iter().map(|v| v.table.clone()).collect()
    }

    /// Aliases of every base relation in this operator subtree.
    pub fn relations(&self) -> BTreeSet<TableName> {
        let mut out = BTreeSet::new();
        self.collect_relations(&mut out);
        out
    }

    fn collect_relations(&self, out: &mut BTreeSet<TableName>) {
        match &self.kind {
            ExprKind::AliasTableName(a) => {
                out.insert(a.alias.clone());
            }
            ExprKind::Join(j) => {
                j.left.collect_relations(out);
                j.right.collect_relations(out);
            }
            ExprKind::Filter(f) => f.child.collect_relations(out),
            _ => {}
        }
    }

    /// True when the subtree references no variable and no table.
    pub fn is_static(&self) -> bool {
        match &self.kind {
            ExprKind::FetchVariable(_) | ExprKind::FetchTable(_) | ExprKind::AliasTableName(_) => {
                false
            }
            _ => self.children().iter().all(|c| c.is_static()),
        }
    }

    /// Flatten AND-chains: `a AND (b AND c)` → `[a, b, c]`.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Function(FunctionNode {
                op: FunctionOp::And,
                args,
            }) => args.iter().flat_map(|a| a.conjuncts()).collect(),
            _ => vec![self],
        }
    }

    /// Owned version of `conjuncts`.
    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self.kind {
            ExprKind::Function(FunctionNode {
                op: FunctionOp::And,
                args,
            }) => args.into_iter().flat_map(Expr::into_conjuncts).collect(),
            kind => vec![Expr::new(kind)],
        }
    }

    /// Evaluate a static subtree. Returns `None` when the subtree references
    /// data or contains an operator the planner cannot evaluate.
    pub fn eval_static(&self) -> Option<ScalarValue> {
        match &self.kind {
            ExprKind::FetchStatic(v) => Some(v.clone()),
            ExprKind::Function(func) => {
                let values = func
                    .args
                    .iter()
                    .map(Expr::eval_static)
                    .collect::<Option<Vec<_>>>()?;
                match (&func.op, values.as_slice()) {
                    (FunctionOp::Compare(op), [l, r]) => Some(l.compare_with(*op, r)),
                    (FunctionOp::Arith(op), [l, r]) => Some(l.arith(*op, r)),
                    (FunctionOp::And, vals) => Some(and_values(vals)),
                    (FunctionOp::Or, vals) => Some(or_values(vals)),
                    (FunctionOp::Not, [v]) => Some(match v {
                        ScalarValue::Bool(b) => ScalarValue::Bool(!b),
                        _ => ScalarValue::Null,
                    }),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Explain
    // -----------------------------------------------------------------------

    /// Indented rendering of an operator tree with cost annotations.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(0, &mut out);
        out
    }

    fn explain_into(&self, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        let cost = match self.cost {
            Some(c) => format!(" (rows={:.1} time={:.1})", c.rows, c.time),
            None => String::new(),
        };
        match &self.kind {
            ExprKind::Join(j) => {
                out.push_str(&format!("{}Join[{:?}]{}", pad, j.join_type, cost));
                if let Some(f) = &j.filter {
                    out.push_str(&format!(" on {}", f));
                }
                if let Some(idx) = &j.strategy.right_index {
                    out.push_str(&format!(" right_index={}", idx));
                }
                if let Some(idx) = &j.strategy.left_index {
                    out.push_str(&format!(" left_index={}", idx));
                }
                if let Some(fact) = &j.strategy.fact {
                    out.push_str(&format!(" fact={}", fact));
                }
                out.push('\n');
                j.left.explain_into(depth + 1, out);
                j.right.explain_into(depth + 1, out);
            }
            ExprKind::Filter(f) => {
                out.push_str(&format!("{}Filter[{}]{}", pad, f.kind.name(), cost));
                match &f.kind {
                    FilterKind::SingleFilter { predicate, index } => {
                        out.push_str(&format!(" {}", predicate));
                        if let Some(idx) = index {
                            out.push_str(&format!(" index={}", idx));
                        }
                    }
                    FilterKind::StaticFilter { predicate } => {
                        out.push_str(&format!(" {}", predicate));
                    }
                    FilterKind::Sort { order, index } => {
                        let keys: Vec<String> = order
                            .iter()
                            .map(|k| format!("{} {}", k.expr, if k.ascending { "ASC" } else { "DESC" }))
                            .collect();
                        out.push_str(&format!(" {}", keys.join(", ")));
                        if let Some(idx) = index {
                            out.push_str(&format!(" index={}", idx));
                        }
                    }
                    FilterKind::ExpressionTable | FilterKind::Aggregate { .. } => {}
                }
                out.push('\n');
                f.child.explain_into(depth + 1, out);
            }
            _ => {
                out.push_str(&format!("{}{}{}\n", pad, self, cost));
            }
        }
    }
}

fn and_values(values: &[ScalarValue]) -> ScalarValue {
    if values.iter().any(ScalarValue::is_false) {
        ScalarValue::Bool(false)
    } else if values.iter().all(ScalarValue::is_true) {
        ScalarValue::Bool(true)
    } else {
        ScalarValue::Null
    }
}

fn or_values(values: &[ScalarValue]) -> ScalarValue {
    if values.iter().any(ScalarValue::is_true) {
        ScalarValue::Bool(true)
    } else if values.iter().all(ScalarValue::is_false) {
        ScalarValue::Bool(false)
    } else {
        ScalarValue::Null
    }
}

fn join_args(f: &mut fmt::Formatter<'_>, args: &[Expr], sep: &str) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::FetchVariable(v) => write!(f, "{}", v),
            ExprKind::FetchStatic(v) => write!(f, "{}", v),
            ExprKind::FetchTable(t) => write!(f, "table({})", t),
            ExprKind::AliasTableName(a) => write!(f, "{} AS {}", a.source, a.alias),
            ExprKind::Function(func) => match (&func.op, func.args.as_slice()) {
                (FunctionOp::Compare(op), [l, r]) => write!(f, "{} {} {}", l, op.symbol(), r),
                (FunctionOp::Arith(op), [l, r]) => write!(f, "({} {} {})", l, op.symbol(), r),
                (FunctionOp::And, args) => {
                    write!(f, "(")?;
                    join_args(f, args, " AND ")?;
                    write!(f, ")")
                }
                (FunctionOp::Or, args) => {
                    write!(f, "(")?;
                    join_args(f, args, " OR ")?;
                    write!(f, ")")
                }
                (FunctionOp::Not, [arg]) => write!(f, "NOT {}", arg),
                (FunctionOp::RangeSet(range), args) => {
                    write!(f, "range_set(")?;
                    join_args(f, args, ", ")?;
                    write!(f, ", {})", range)
                }
                (FunctionOp::Call(name), args) => {
                    write!(f, "{}(", name)?;
                    join_args(f, args, ", ")?;
                    write!(f, ")")
                }
                (op, args) => {
                    write!(f, "{:?}(", op)?;
                    join_args(f, args, ", ")?;
                    write!(f, ")")
                }
            },
            ExprKind::Filter(node) => write!(f, "{}({})", node.kind.name(), node.child),
            ExprKind::Join(j) => write!(f, "join[{:?}]({}, {})", j.join_type, j.left, j.right),
        }
    }
}
