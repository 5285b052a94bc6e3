//! # Join Graph Flattening
//!
//! The upstream producer hands over a tree of `Join` and `AliasTableName` nodes.
//! The planner discards its shape and keeps only what constrains reordering:
//!
//! - the base relations, in graph order;
//! - every outer join, with the aliases of its left and right branches and its
//!   ON clause, listed bottom-up;
//! - every inner-join filter, tagged with the outer joins whose right branch
//!   contains it.
//!
//! Right outer joins are turned into left outer joins by swapping their inputs.
//! Full outer joins cannot be reordered by this planner and are rejected.

use qplan_core::error::{PlanError, Result};
use qplan_core::expr::{Expr, ExprKind, JoinType, TableName};
use std::collections::BTreeSet;

/// A base relation under its alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub alias: TableName,
    pub table: TableName,
}

/// A left outer join of the input graph.
#[derive(Debug, Clone)]
pub struct OuterJoin {
    pub id: usize,
    pub left_tables: BTreeSet<TableName>,
    pub right_tables: BTreeSet<TableName>,
    pub filter: Option<Expr>,
    /// Outer joins whose right branch contains this join.
    pub inside: BTreeSet<usize>,
}

/// A filter taken from an inner or Cartesian join of the input graph.
#[derive(Debug, Clone)]
pub struct GraphFilter {
    pub expr: Expr,
    /// Relations under the join the filter was taken from.
    pub tables: BTreeSet<TableName>,
    pub inside: BTreeSet<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    pub relations: Vec<Relation>,
    /// Bottom-up: an outer join is listed after every outer join below it.
    pub outer_joins: Vec<OuterJoin>,
    pub inner_filters: Vec<GraphFilter>,
}

impl JoinGraph {
    pub fn aliases(&self) -> BTreeSet<TableName> {
        self.relations.iter().map(|r| r.alias.clone()).collect()
    }

    pub fn outer_join(&self, id: usize) -> Option<&OuterJoin> {
        self.outer_joins.iter().find(|j| j.id == id)
    }
}

/// Flatten a join graph. `None` is a query without a FROM clause.
pub fn flatten(graph: Option<&Expr>) -> Result<JoinGraph> {
    let mut out = JoinGraph::default();
    if let Some(root) = graph {
        let mut next_id = 0;
        walk(root, &BTreeSet::new(), &mut next_id, &mut out)?;
    }
    let mut seen = BTreeSet::new();
    for rel in &out.relations {
        if !seen.insert(rel.alias.clone()) {
            return Err(PlanError::Bookkeeping(format!(
                "alias {} appears more than once in the join graph",
                rel.alias
            )));
        }
    }
    Ok(out)
}

fn walk(
    expr: &Expr,
    inside: &BTreeSet<usize>,
    next_id: &mut usize,
    out: &mut JoinGraph,
) -> Result<BTreeSet<TableName>> {
    match &expr.kind {
        ExprKind::AliasTableName(alias) => match &alias.source.kind {
            ExprKind::FetchTable(table) => {
                out.relations.push(Relation {
                    alias: alias.alias.clone(),
                    table: table.clone(),
                });
                Ok(BTreeSet::from([alias.alias.clone()]))
            }
            _ => Err(PlanError::UnexpectedNode {
                kind: alias.source.kind_name(),
                context: "alias source",
                node: alias.source.to_string(),
            }),
        },
        ExprKind::Join(join) => match join.join_type {
            JoinType::Cartesian | JoinType::Inner => {
                let mut tables = walk(&join.left, inside, next_id, out)?;
                tables.extend(walk(&join.right, inside, next_id, out)?);
                if let Some(filter) = &join.filter {
                    out.inner_filters.push(GraphFilter {
                        expr: filter.as_ref().clone(),
                        tables: tables.clone(),
                        inside: inside.clone(),
                    });
                }
                Ok(tables)
            }
            JoinType::OuterLeft | JoinType::OuterRight => {
                let (left, right) = if join.join_type == JoinType::OuterRight {
                    (&join.right, &join.left)
                } else {
                    (&join.left, &join.right)
                };
                let id = *next_id;
                *next_id += 1;
                let left_tables = walk(left, inside, next_id, out)?;
                let mut right_inside = inside.clone();
                right_inside.insert(id);
                let right_tables = walk(right, &right_inside, next_id, out)?;
                let tables = left_tables.union(&right_tables).cloned().collect();
                out.outer_joins.push(OuterJoin {
                    id,
                    left_tables,
                    right_tables,
                    filter: join.filter.as_deref().cloned(),
                    inside: inside.clone(),
                });
                Ok(tables)
            }
            JoinType::FullOuter => Err(PlanError::UnsupportedJoinType {
                join_type: JoinType::FullOuter,
                context: "join graph",
            }),
        },
        _ => Err(PlanError::UnexpectedNode {
            kind: expr.kind_name(),
            context: "join graph",
            node: expr.to_string(),
        }),
    }
}
