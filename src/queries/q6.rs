// TPC-H Q6: revenue from discounted shipments of 1994.
//
//   select sum(l_extendedprice * l_discount)
//   from lineitem
//   where l_shipdate >= '1994-01-01' and l_shipdate < '1995-01-01'
//     and l_discount between 0.05 and 0.07 and l_quantity < 24

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::Result;
use crate::queries::{val, POS_SIZE};
use crate::runtime::{barrier, morsel_range, this_worker, with_source, GlobalPool, WorkerGroup};
use crate::storage::{Database, Relation};
use crate::types::{Date, Integer, Numeric, ScalarKind};
use crate::vectorized::{
    EngineConfig, Expression, FixedAggregation, Operand, Operator, Project, QueryBuffers, Scan,
    Select,
};

fn result_relation(total: i64) -> Relation {
    let mut result = Relation::new("q6");
    let col = result.insert("revenue", ScalarKind::Numeric(4));
    col.reset(1);
    col.push(Numeric::<4>::from_raw(total));
    result.nr_tuples = 1;
    result
}

/// Fused loop, parallel-reduced over the scan range.
pub fn q6_compiled(db: &Database, _nr_threads: usize) -> Result<Relation> {
    let rel = db.get("lineitem")?;
    let shipdate = rel.column("l_shipdate")?.data::<Date>();
    let quantity = rel.column("l_quantity")?.data::<Numeric<2>>();
    let price = rel.column("l_extendedprice")?.data::<Numeric<2>>();
    let discount = rel.column("l_discount")?.data::<Numeric<2>>();

    let c1 = Date::parse("1994-01-01")?.value;
    let c2 = Date::parse("1995-01-01")?.value;
    let c3 = Numeric::<2>::parse("0.05")?.raw();
    let c4 = Numeric::<2>::parse("0.07")?.raw();
    let c5 = Numeric::<2>::from(Integer::new(24)).raw();

    let total = (0..rel.nr_tuples)
        .into_par_iter()
        .with_min_len(4096)
        .fold(
            || 0i64,
            |acc, i| {
                let d = shipdate[i].value;
                if d >= c1 && d < c2 {
                    let disc = discount[i].raw();
                    if disc >= c3 && disc <= c4 && quantity[i].raw() < c5 {
                        return acc.wrapping_add(price[i].raw().wrapping_mul(disc));
                    }
                }
                acc
            },
        )
        .reduce(|| 0i64, i64::wrapping_add);

    Ok(result_relation(total))
}

struct Consts {
    c1: i32,
    c2: i32,
    c3: i64,
    c4: i64,
    c5: i64,
    aggregator: UnsafeCell<i64>,
}

/// Operator pipeline: Scan -> Select -> Project -> FixedAggregation, one
/// morsel per worker, global sum through a shared atomic, result written by
/// the barrier leader.
pub fn q6_vectorized(db: &Database, nr_threads: usize, conf: &EngineConfig) -> Result<Relation> {
    let rel = db.get("lineitem")?;
    assert_eq!(rel.column("l_shipdate")?.rt_size(), 4);
    assert_eq!(rel.column("l_quantity")?.rt_size(), 8);
    assert_eq!(rel.column("l_discount")?.rt_size(), 8);
    assert_eq!(rel.column("l_extendedprice")?.rt_size(), 8);

    let pool = Arc::new(GlobalPool::new());
    let workers = WorkerGroup::new(nr_threads);
    let aggr = AtomicI64::new(0);
    let result = Mutex::new(None);

    workers.run(|| {
        with_source(&pool, || -> Result<()> {
            let consts = Box::new(Consts {
                c1: Date::parse("1994-01-01")?.value,
                c2: Date::parse("1995-01-01")?.value,
                c3: Numeric::<2>::parse("0.05")?.raw(),
                c4: Numeric::<2>::parse("0.07")?.raw(),
                c5: Numeric::<2>::from(Integer::new(24)).raw(),
                aggregator: UnsafeCell::new(0),
            });

            let ctx = this_worker();
            let (begin, end) = morsel_range(ctx.id, ctx.nr_workers, rel.nr_tuples);
            drop(ctx);

            let mut bufs = QueryBuffers::new(conf.vector_size);
            let mut scan = Scan::over_range(begin, end, conf.vector_size);
            let shipdate = scan.cursor(rel.column("l_shipdate")?);
            let quantity = scan.cursor(rel.column("l_quantity")?);
            let discount = scan.cursor(rel.column("l_discount")?);
            let price = scan.cursor(rel.column("l_extendedprice")?);

            let sel_a = bufs.get(0, POS_SIZE)?;
            let sel_b = bufs.get(1, POS_SIZE)?;
            let revenue = bufs.get(2, 8)?;

            let select_expr = Expression::new()
                .add_f3(
                    conf.sel_less_i32_col_val(),
                    Operand::Buffer(sel_a),
                    Operand::Column(shipdate.clone()),
                    val(&consts.c2),
                )
                .add_f4(
                    conf.selsel_greater_equal_i32_col_val(),
                    Operand::Buffer(sel_a),
                    Operand::Buffer(sel_b),
                    Operand::Column(shipdate),
                    val(&consts.c1),
                )
                .add_f4(
                    conf.selsel_less_i64_col_val(),
                    Operand::Buffer(sel_b),
                    Operand::Buffer(sel_a),
                    Operand::Column(quantity),
                    val(&consts.c5),
                )
                .add_f4(
                    conf.selsel_greater_equal_i64_col_val(),
                    Operand::Buffer(sel_a),
                    Operand::Buffer(sel_b),
                    Operand::Column(discount.clone()),
                    val(&consts.c3),
                )
                .add_f4(
                    conf.selsel_less_equal_i64_col_val(),
                    Operand::Buffer(sel_b),
                    Operand::Buffer(sel_a),
                    Operand::Column(discount.clone()),
                    val(&consts.c4),
                );

            let project_expr = Expression::new().add_f4(
                conf.proj_sel_both_multiplies_i64_col_col(),
                Operand::Buffer(sel_a),
                Operand::Buffer(revenue),
                Operand::Column(discount),
                Operand::Column(price),
            );

            let aggr_expr = Expression::new().add_f2(
                conf.aggr_static_plus_i64_col(),
                Operand::Value(consts.aggregator.get() as *const _),
                Operand::Buffer(revenue),
            );

            let select = Select::new(Box::new(scan), select_expr);
            let project = Project::new(Box::new(select), project_expr);
            let mut root = FixedAggregation::new(Box::new(project), aggr_expr);

            let produced = root.next()?;
            if produced > 0 {
                aggr.fetch_add(unsafe { *consts.aggregator.get() }, Ordering::Relaxed);
            }

            if barrier() {
                *result.lock() = Some(result_relation(aggr.load(Ordering::SeqCst)));
            }
            Ok(())
        })
    })?;

    let relation = result.into_inner().expect("barrier leader wrote the result");
    Ok(relation)
}
