// Pull-based physical operators.
//
// `next()` produces the next batch and returns its logical row count, 0 at
// end of stream. A batch is never materialized as an object: operators agree
// at build time on the buffers and column cursors that carry it, so the
// count is the only thing passed at runtime. No operator ever returns more
// than the configured vector size from one call.

use std::rc::Rc;

use crate::error::Result;
use crate::storage::{Column, Relation};
use crate::vectorized::expression::{ColumnCursor, Expression};

pub trait Operator {
    /// Produce the next batch; 0 means exhausted.
    fn next(&mut self) -> Result<usize>;
}

/// Morsel scan: emits dense batches over a half-open row range. Parallel
/// plans give every worker its own scan over a disjoint range.
pub struct Scan {
    cursors: Vec<Rc<ColumnCursor>>,
    position: usize,
    end: usize,
    vector_size: usize,
}

impl Scan {
    pub fn new(relation: &Relation, vector_size: usize) -> Self {
        Self::over_range(0, relation.nr_tuples, vector_size)
    }

    pub fn over_range(begin: usize, end: usize, vector_size: usize) -> Self {
        assert!(begin <= end);
        assert!(vector_size > 0);
        Self { cursors: Vec::new(), position: begin, end, vector_size }
    }

    /// Register a column; the returned cursor tracks the scan's batches.
    pub fn cursor(&mut self, column: &Column) -> Rc<ColumnCursor> {
        let c = ColumnCursor::new(column);
        self.cursors.push(c.clone());
        c
    }
}

impl Operator for Scan {
    fn next(&mut self) -> Result<usize> {
        if self.position >= self.end {
            return Ok(0);
        }
        let n = self.vector_size.min(self.end - self.position);
        for c in &self.cursors {
            c.seek(self.position);
        }
        self.position += n;
        Ok(n)
    }
}

/// Filter: runs its expression over each child batch; the last primitive's
/// selection vector identifies the surviving rows and its count is the
/// batch's new logical size. Batches with no survivors are skipped.
pub struct Select {
    child: Box<dyn Operator>,
    expr: Expression,
}

impl Select {
    pub fn new(child: Box<dyn Operator>, expr: Expression) -> Self {
        Self { child, expr }
    }
}

impl Operator for Select {
    fn next(&mut self) -> Result<usize> {
        loop {
            let n = self.child.next()?;
            if n == 0 {
                return Ok(0);
            }
            let kept = unsafe { self.expr.evaluate(n) };
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

/// Projection: every primitive writes a derived column into its output
/// buffer; the logical row count passes through unchanged.
pub struct Project {
    child: Box<dyn Operator>,
    expr: Expression,
}

impl Project {
    pub fn new(child: Box<dyn Operator>, expr: Expression) -> Self {
        Self { child, expr }
    }
}

impl Operator for Project {
    fn next(&mut self) -> Result<usize> {
        let n = self.child.next()?;
        if n == 0 {
            return Ok(0);
        }
        unsafe { self.expr.evaluate(n) };
        Ok(n)
    }
}

/// Terminal fold into caller-owned accumulators bound as Value operands.
/// Drains the child, then yields exactly one row (even over empty input)
/// and 0 afterwards.
pub struct FixedAggregation {
    child: Box<dyn Operator>,
    expr: Expression,
    done: bool,
}

impl FixedAggregation {
    pub fn new(child: Box<dyn Operator>, expr: Expression) -> Self {
        Self { child, expr, done: false }
    }
}

impl Operator for FixedAggregation {
    fn next(&mut self) -> Result<usize> {
        if self.done {
            return Ok(0);
        }
        loop {
            let n = self.child.next()?;
            if n == 0 {
                break;
            }
            unsafe { self.expr.evaluate(n) };
        }
        self.done = true;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Relation;
    use crate::types::{Integer, Numeric, ScalarKind};
    use crate::vectorized::expression::{Operand, QueryBuffers};
    use crate::vectorized::primitives::{aggregate, select};
    use crate::vectorized::Pos;

    fn test_relation(n: usize) -> Relation {
        let mut rel = Relation::new("t");
        {
            let c = rel.insert("a", ScalarKind::Integer);
            for i in 0..n {
                c.push(Integer::new(i as i32));
            }
        }
        {
            let c = rel.insert("v", ScalarKind::Numeric(2));
            for i in 0..n {
                c.push(Numeric::<2>::from_raw(i as i64 * 100));
            }
        }
        rel.nr_tuples = n;
        rel
    }

    #[test]
    fn scan_batches_are_bounded() {
        let rel = test_relation(2500);
        let mut scan = Scan::new(&rel, 1024);
        let _c = scan.cursor(rel.column("a").unwrap());
        let mut sizes = Vec::new();
        loop {
            let n = scan.next().unwrap();
            if n == 0 {
                break;
            }
            assert!(n <= 1024);
            sizes.push(n);
        }
        assert_eq!(sizes, vec![1024, 1024, 452]);
    }

    #[test]
    fn select_project_aggregate_pipeline() {
        let rel = test_relation(2000);
        let vector_size = 128;
        let mut bufs = QueryBuffers::new(vector_size);

        let mut scan = Scan::new(&rel, vector_size);
        let a = scan.cursor(rel.column("a").unwrap());
        let v = scan.cursor(rel.column("v").unwrap());

        let sel = bufs.get(0, std::mem::size_of::<Pos>()).unwrap();
        let pivot = Box::new(100i32);
        let select_expr = Expression::new().add_f3(
            select::sel_less_col_val::<i32>,
            Operand::Buffer(sel),
            Operand::Column(a),
            Operand::Value(&*pivot as *const i32 as *const _),
        );

        let acc = Box::new(std::cell::UnsafeCell::new(0i64));
        let aggr_expr = Expression::new().add_f3(
            aggregate::aggr_static_plus_sel_i64_col,
            Operand::Value(acc.get() as *const _),
            Operand::Buffer(sel),
            Operand::Column(v),
        );

        let select = Select::new(Box::new(scan), select_expr);
        let mut root = FixedAggregation::new(Box::new(select), aggr_expr);

        assert_eq!(root.next().unwrap(), 1);
        assert_eq!(root.next().unwrap(), 0);
        // sum of v for a < 100: 100*(0+..+99)
        let total = unsafe { *acc.get() };
        assert_eq!(total, 100 * (99 * 100 / 2));
    }

    #[test]
    fn fixed_aggregation_emits_one_row_on_empty_input() {
        let rel = test_relation(0);
        let vector_size = 64;
        let mut scan = Scan::new(&rel, vector_size);
        let _v = scan.cursor(rel.column("v").unwrap());
        let mut root = FixedAggregation::new(Box::new(scan), Expression::new());
        assert_eq!(root.next().unwrap(), 1);
        assert_eq!(root.next().unwrap(), 0);
    }
}
