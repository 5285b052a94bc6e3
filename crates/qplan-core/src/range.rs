//! # Range Algebra
//!
//! A `SelectableRange` represents an arbitrary boolean combination of comparisons
//! against one column (or a composite list of columns) as a normalized, ordered
//! list of disjoint `(lower, upper)` bound pairs. This is what lets the planner
//! turn `x > 5 AND x < 100 OR x = 200` into a single index probe.
//!
//! ## Bound Points
//!
//! Bounds live in an extended ordered space:
//!
//! ```text
//! BeforeFirst < [NULL tuples] < First <= [non-null tuples] <= Last < AfterLast
//! ```
//!
//! A value tuple `t` contributes two points, `Before(t)` and `After(t)`, which sit
//! immediately around it. A pair `(lower, upper)` covers exactly the tuples `v`
//! with `lower < v < upper`, so `x = 5` is `(Before(5), After(5))`, `x < 5` is
//! `(First, Before(5))` (NULL never satisfies `<`), and the full range is
//! `(BeforeFirst, AfterLast)`. A pair is empty when `lower >= upper`.
//!
//! ## Composite Tuples
//!
//! Tuples are compared element by element. When one tuple is a prefix of the
//! other they compare equal: the shorter tuple acts as an *anchor*, so a range
//! built on the first column of a composite index covers every key sharing
//! that prefix.
//!
//! ## Invariant
//!
//! After every operation the pair list is sorted, pairwise disjoint and minimal
//! (overlapping or touching pairs are merged).

use crate::error::{PlanError, Result};
use crate::expr::CompareOp;
use crate::value::{ScalarValue, ValueClass};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// One bound of a range pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangePoint {
    /// Below every tuple, NULLs included.
    BeforeFirst,
    /// After the NULL tuples, below every non-null tuple.
    First,
    /// Immediately before the tuple.
    Before(Vec<ScalarValue>),
    /// Immediately after the tuple.
    After(Vec<ScalarValue>),
    /// After every non-null tuple.
    Last,
    /// Above everything.
    AfterLast,
}

/// Compare tuples over their shared prefix; a prefix match is `Equal`.
fn tuple_cmp(a: &[ScalarValue], b: &[ScalarValue]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn leading_null(t: &[ScalarValue]) -> bool {
    t.first().map_or(false, ScalarValue::is_null)
}

impl RangePoint {
    /// Order two points in the extended space.
    pub fn cmp_point(&self, other: &RangePoint) -> Ordering {
        use RangePoint::*;
        match (self, other) {
            (BeforeFirst, BeforeFirst) | (First, First) | (Last, Last) | (AfterLast, AfterLast) => {
                Ordering::Equal
            }
            (BeforeFirst, _) => Ordering::Less,
            (_, BeforeFirst) => Ordering::Greater,
            (AfterLast, _) => Ordering::Greater,
            (_, AfterLast) => Ordering::Less,
            (Last, _) => Ordering::Greater,
            (_, Last) => Ordering::Less,
            (First, Before(t) | After(t)) => {
                if leading_null(t) {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (Before(_) | After(_), First) => other.cmp_point(self).reverse(),
            (Before(a), Before(b)) | (After(a), After(b)) => tuple_cmp(a, b),
            (Before(a), After(b)) => match tuple_cmp(a, b) {
                Ordering::Equal => Ordering::Less,
                o => o,
            },
            (After(a), Before(b)) => match tuple_cmp(a, b) {
                Ordering::Equal => Ordering::Greater,
                o => o,
            },
        }
    }

    /// Position of this point relative to a value tuple. Never `Equal`.
    pub fn cmp_value(&self, value: &[ScalarValue]) -> Ordering {
        use RangePoint::*;
        match self {
            BeforeFirst => Ordering::Less,
            First => {
                if leading_null(value) {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            Before(t) => match tuple_cmp(t, value) {
                Ordering::Equal => Ordering::Less,
                o => o,
            },
            After(t) => match tuple_cmp(t, value) {
                Ordering::Equal => Ordering::Greater,
                o => o,
            },
            Last | AfterLast => Ordering::Greater,
        }
    }

    fn tuple(&self) -> Option<&[ScalarValue]> {
        match self {
            RangePoint::Before(t) | RangePoint::After(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for RangePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tuple = |f: &mut fmt::Formatter<'_>, t: &[ScalarValue]| -> fmt::Result {
            let parts: Vec<String> = t.iter().map(|v| v.to_string()).collect();
            write!(f, "{}", parts.join(", "))
        };
        match self {
            RangePoint::BeforeFirst => write!(f, "BEFORE_FIRST"),
            RangePoint::First => write!(f, "FIRST"),
            RangePoint::Before(t) => {
                write!(f, "before(")?;
                tuple(f, t)?;
                write!(f, ")")
            }
            RangePoint::After(t) => {
                write!(f, "after(")?;
                tuple(f, t)?;
                write!(f, ")")
            }
            RangePoint::Last => write!(f, "LAST"),
            RangePoint::AfterLast => write!(f, "AFTER_LAST"),
        }
    }
}

/// One `(lower, upper)` bound pair. Covers tuples strictly between the points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangePair {
    pub lower: RangePoint,
    pub upper: RangePoint,
}

impl RangePair {
    pub fn new(lower: RangePoint, upper: RangePoint) -> Self {
        Self { lower, upper }
    }

    pub fn is_empty(&self) -> bool {
        self.lower.cmp_point(&self.upper) != Ordering::Less
    }

    pub fn contains(&self, value: &[ScalarValue]) -> bool {
        self.lower.cmp_value(value) == Ordering::Less
            && self.upper.cmp_value(value) == Ordering::Greater
    }

    /// Overlapping or touching pairs can be merged into one.
    fn meets(&self, other: &RangePair) -> bool {
        self.lower.cmp_point(&other.upper) != Ordering::Greater
            && other.lower.cmp_point(&self.upper) != Ordering::Greater
    }

    fn intersection(&self, other: &RangePair) -> RangePair {
        let lower = if other.lower.cmp_point(&self.lower) == Ordering::Greater {
            other.lower.clone()
        } else {
            self.lower.clone()
        };
        let upper = if other.upper.cmp_point(&self.upper) == Ordering::Less {
            other.upper.clone()
        } else {
            self.upper.clone()
        };
        RangePair { lower, upper }
    }

    fn hull(self, other: RangePair) -> RangePair {
        let lower = if other.lower.cmp_point(&self.lower) == Ordering::Less {
            other.lower
        } else {
            self.lower
        };
        let upper = if other.upper.cmp_point(&self.upper) == Ordering::Greater {
            other.upper
        } else {
            self.upper
        };
        RangePair { lower, upper }
    }
}

impl fmt::Display for RangePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.lower, self.upper)
    }
}

/// Sorted, disjoint, minimal set of range pairs over `width` columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct SelectableRange {
    width: usize,
    pairs: Vec<RangePair>,
}

/// The wire form of a `SelectableRange`, normalized on the way in.
#[derive(Deserialize)]
struct RawRange {
    width: usize,
    pairs: Vec<RangePair>,
}

impl TryFrom<RawRange> for SelectableRange {
    type Error = PlanError;

    fn try_from(raw: RawRange) -> Result<Self> {
        for pair in &raw.pairs {
            for point in [&pair.lower, &pair.upper] {
                if let RangePoint::Before(t) | RangePoint::After(t) = point {
                    if t.is_empty() {
                        return Err(PlanError::EmptyRangeTuple);
                    }
                    if t.len() != raw.width {
                        return Err(PlanError::RangeWidthMismatch {
                            left: raw.width,
                            right: t.len(),
                        });
                    }
                }
            }
        }
        Ok(Self::normalized(raw.width, raw.pairs))
    }
}

impl SelectableRange {
    /// Every tuple, NULLs included.
    pub fn full(width: usize) -> Self {
        Self {
            width,
            pairs: vec![RangePair::new(RangePoint::BeforeFirst, RangePoint::AfterLast)],
        }
    }

    /// No tuple at all.
    pub fn empty(width: usize) -> Self {
        Self {
            width,
            pairs: Vec::new(),
        }
    }

    /// Build the minimal range for `column OP values`.
    pub fn construct(op: CompareOp, values: Vec<ScalarValue>) -> Result<Self> {
        if values.is_empty() {
            return Err(PlanError::EmptyRangeTuple);
        }
        use RangePoint::*;
        let width = values.len();
        let pairs = match op {
            CompareOp::Eq | CompareOp::Is => {
                vec![RangePair::new(Before(values.clone()), After(values))]
            }
            CompareOp::NotEq => vec![
                RangePair::new(First, Before(values.clone())),
                RangePair::new(After(values), Last),
            ],
            // `x IS NOT NULL` is every non-null value.
            CompareOp::IsNot if values.iter().all(ScalarValue::is_null) => {
                vec![RangePair::new(First, Last)]
            }
            CompareOp::IsNot => vec![
                RangePair::new(BeforeFirst, Before(values.clone())),
                RangePair::new(After(values), AfterLast),
            ],
            CompareOp::Lt => vec![RangePair::new(First, Before(values))],
            CompareOp::LtEq => vec![RangePair::new(First, After(values))],
            CompareOp::Gt => vec![RangePair::new(After(values), Last)],
            CompareOp::GtEq => vec![RangePair::new(Before(values), Last)],
        };
        Ok(Self::normalized(width, pairs))
    }

    /// Build a range from arbitrary pairs, restoring the invariant.
    pub fn from_pairs(width: usize, pairs: Vec<RangePair>) -> Self {
        Self::normalized(width, pairs)
    }

    fn normalized(width: usize, pairs: Vec<RangePair>) -> Self {
        let mut out = Vec::with_capacity(pairs.len());
        for pair in pairs.into_iter().filter(|p| !p.is_empty()) {
            absorb(&mut out, pair);
        }
        Self { width, pairs: out }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn pairs(&self) -> &[RangePair] {
        &self.pairs
    }

    /// Number of disjoint pairs.
    pub fn count(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        matches!(
            self.pairs.as_slice(),
            [RangePair { lower: RangePoint::BeforeFirst, upper: RangePoint::AfterLast }]
        )
    }

    fn check_width(&self, other: &SelectableRange) -> Result<()> {
        if self.width != other.width {
            return Err(PlanError::RangeWidthMismatch {
                left: self.width,
                right: other.width,
            });
        }
        Ok(())
    }

    /// Pairwise intersection over `self × other`, dropping empty results.
    pub fn intersect(&self, other: &SelectableRange) -> Result<SelectableRange> {
        self.check_width(other)?;
        let mut survivors = Vec::new();
        for a in &self.pairs {
            for b in &other.pairs {
                let pair = a.intersection(b);
                if !pair.is_empty() {
                    survivors.push(pair);
                }
            }
        }
        Ok(Self::normalized(self.width, survivors))
    }

    /// Union: start from `other` and absorb every pair of `self`.
    pub fn union(&self, other: &SelectableRange) -> Result<SelectableRange> {
        self.check_width(other)?;
        let mut pairs = other.pairs.clone();
        for pair in &self.pairs {
            absorb(&mut pairs, pair.clone());
        }
        Ok(Self {
            width: self.width,
            pairs,
        })
    }

    /// Point-in-range test.
    pub fn intersects(&self, value: &[ScalarValue]) -> bool {
        self.pairs.iter().any(|p| p.contains(value))
    }

    /// The tuple this range pins down exactly, when it is a single point.
    pub fn point_value(&self) -> Option<&[ScalarValue]> {
        match self.pairs.as_slice() {
            [RangePair {
                lower: RangePoint::Before(lo),
                upper: RangePoint::After(hi),
            }] if lo.len() == hi.len() && lo == hi => Some(lo),
            _ => None,
        }
    }

    /// Classes of the non-null values the bounds were built from.
    pub fn value_classes(&self) -> BTreeSet<ValueClass> {
        self.pairs
            .iter()
            .flat_map(|p| [p.lower.tuple(), p.upper.tuple()])
            .flatten()
            .flat_map(|t| t.iter())
            .filter(|v| !v.is_null())
            .map(ScalarValue::class)
            .collect()
    }

    /// Whether two ranges were built from values of one type, so merging them
    /// compares like with like.
    pub fn same_value_type(&self, other: &SelectableRange) -> bool {
        let mut classes = self.value_classes();
        classes.extend(other.value_classes());
        classes.len() <= 1
    }
}

/// Insert `pair` into a sorted disjoint list, first merging every pair it meets.
fn absorb(pairs: &mut Vec<RangePair>, mut pair: RangePair) {
    while let Some(i) = pairs.iter().position(|q| q.meets(&pair)) {
        let q = pairs.remove(i);
        pair = pair.hull(q);
    }
    let at = pairs
        .iter()
        .position(|q| q.lower.cmp_point(&pair.lower) == Ordering::Greater)
        .unwrap_or(pairs.len());
    pairs.insert(at, pair);
}

impl fmt::Display for SelectableRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{")?;
        for (i, pair) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", pair)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Vec<ScalarValue> {
        vec![ScalarValue::Int64(v)]
    }

    fn range(op: CompareOp, v: i64) -> SelectableRange {
        SelectableRange::construct(op, int(v)).unwrap()
    }

    #[test]
    fn test_construct_shapes() {
        assert_eq!(range(CompareOp::Eq, 5).count(), 1);
        assert_eq!(range(CompareOp::NotEq, 5).count(), 2);
        assert_eq!(range(CompareOp::IsNot, 5).count(), 2);
        assert_eq!(range(CompareOp::Gt, 5).count(), 1);
        assert!(SelectableRange::construct(CompareOp::Eq, vec![]).is_err());
    }

    #[test]
    fn test_construct_membership() {
        let null = [ScalarValue::Null];
        let lt = range(CompareOp::Lt, 5);
        assert!(lt.intersects(&int(4)));
        assert!(!lt.intersects(&int(5)));
        assert!(!lt.intersects(&null));

        let le = range(CompareOp::LtEq, 5);
        assert!(le.intersects(&int(5)));

        let ne = range(CompareOp::NotEq, 5);
        assert!(ne.intersects(&int(6)) && ne.intersects(&int(4)));
        assert!(!ne.intersects(&int(5)) && !ne.intersects(&null));

        let is_not = range(CompareOp::IsNot, 5);
        assert!(is_not.intersects(&null));

        let is_null = SelectableRange::construct(CompareOp::Is, vec![ScalarValue::Null]).unwrap();
        assert!(is_null.intersects(&null));
        assert!(!is_null.intersects(&int(0)));

        let not_null = SelectableRange::construct(CompareOp::IsNot, vec![ScalarValue::Null]).unwrap();
        assert!(!not_null.intersects(&null));
        assert!(not_null.intersects(&int(0)));
    }

    #[test]
    fn test_intersect_bounds() {
        let both = range(CompareOp::Gt, 5).intersect(&range(CompareOp::Lt, 100)).unwrap();
        let direct = SelectableRange::from_pairs(
            1,
            vec![RangePair::new(RangePoint::After(int(5)), RangePoint::Before(int(100)))],
        );
        assert_eq!(both, direct);
        assert!(both.intersects(&int(50)));
        assert!(!both.intersects(&int(5)));
    }

    #[test]
    fn test_eq_and_not_eq_is_empty() {
        let r = range(CompareOp::Eq, 7).intersect(&range(CompareOp::NotEq, 7)).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_union_merges_touching_pairs() {
        let lt = range(CompareOp::Lt, 5);
        let ge = range(CompareOp::GtEq, 5);
        let u = lt.union(&ge).unwrap();
        assert_eq!(u.count(), 1);
        assert_eq!(u.pairs()[0], RangePair::new(RangePoint::First, RangePoint::Last));

        let gap = range(CompareOp::Lt, 5).union(&range(CompareOp::Gt, 5)).unwrap();
        assert_eq!(gap, range(CompareOp::NotEq, 5));
    }

    #[test]
    fn test_width_mismatch_is_fatal() {
        let one = range(CompareOp::Eq, 1);
        let two =
            SelectableRange::construct(CompareOp::Eq, vec![ScalarValue::Int64(1), ScalarValue::Int64(2)])
                .unwrap();
        assert_eq!(
            one.intersect(&two),
            Err(PlanError::RangeWidthMismatch { left: 1, right: 2 })
        );
        assert!(one.union(&two).is_err());
    }

    #[test]
    fn test_prefix_anchor_covers_composite_keys() {
        let prefix = range(CompareOp::Eq, 3);
        assert!(prefix.intersects(&[ScalarValue::Int64(3), ScalarValue::Int64(99)]));
        assert!(!prefix.intersects(&[ScalarValue::Int64(4), ScalarValue::Int64(0)]));
    }

    #[test]
    fn test_point_value_and_types() {
        let eq = range(CompareOp::Eq, 9);
        assert_eq!(eq.point_value(), Some(int(9).as_slice()));
        assert_eq!(range(CompareOp::Gt, 9).point_value(), None);
        let text = SelectableRange::construct(CompareOp::Eq, vec![ScalarValue::utf8("a")]).unwrap();
        assert!(!eq.same_value_type(&text));
        assert!(eq.same_value_type(&SelectableRange::full(1)));
    }
}
