// TPC-H Q1: pricing summary report.
//
//   select l_returnflag, l_linestatus, sum(l_quantity), sum(l_extendedprice),
//          sum(l_extendedprice * (1 - l_discount)),
//          sum(l_extendedprice * (1 - l_discount) * (1 + l_tax)),
//          avg(l_quantity), avg(l_extendedprice), avg(l_discount), count(*)
//   from lineitem
//   where l_shipdate <= '1998-09-02'
//   group by l_returnflag, l_linestatus
//   order by l_returnflag, l_linestatus

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::Result;
use crate::queries::{val, POS_SIZE};
use crate::runtime::{barrier, morsel_range, this_worker, with_source, GlobalPool, WorkerGroup};
use crate::storage::{Database, Relation};
use crate::types::{Char, Date, Integer, Numeric, ScalarKind};
use crate::vectorized::{
    Access, Aggr, EngineConfig, Expression, GroupShared, HashGroup, Operand, Operator,
    QueryBuffers, Scan, Select,
};

#[derive(Clone, Copy, Default)]
struct Acc {
    qty: i64,
    price: i64,
    disc_price: i64,
    charge: i64,
    disc: i64,
    count: i64,
}

fn merge_maps(
    mut a: HashMap<(u8, u8), Acc>,
    b: HashMap<(u8, u8), Acc>,
) -> HashMap<(u8, u8), Acc> {
    for (k, v) in b {
        let acc = a.entry(k).or_default();
        acc.qty += v.qty;
        acc.price += v.price;
        acc.disc_price += v.disc_price;
        acc.charge += v.charge;
        acc.disc += v.disc;
        acc.count += v.count;
    }
    a
}

fn result_relation(mut groups: Vec<((u8, u8), Acc)>) -> Relation {
    groups.sort_by_key(|(k, _)| *k);

    let mut result = Relation::new("q1");
    result.insert("l_returnflag", ScalarKind::Char(1));
    result.insert("l_linestatus", ScalarKind::Char(1));
    result.insert("sum_qty", ScalarKind::Numeric(2));
    result.insert("sum_base_price", ScalarKind::Numeric(2));
    result.insert("sum_disc_price", ScalarKind::Numeric(4));
    result.insert("sum_charge", ScalarKind::Numeric(6));
    result.insert("avg_qty", ScalarKind::Numeric(2));
    result.insert("avg_price", ScalarKind::Numeric(2));
    result.insert("avg_disc", ScalarKind::Numeric(2));
    result.insert("count_order", ScalarKind::Integer);

    for ((rf, ls), acc) in &groups {
        let count = Integer::new(acc.count as i32);
        result
            .column_mut("l_returnflag")
            .expect("result schema")
            .push(Char::<1> { len: 1, data: [*rf] });
        result
            .column_mut("l_linestatus")
            .expect("result schema")
            .push(Char::<1> { len: 1, data: [*ls] });
        result
            .column_mut("sum_qty")
            .expect("result schema")
            .push(Numeric::<2>::from_raw(acc.qty));
        result
            .column_mut("sum_base_price")
            .expect("result schema")
            .push(Numeric::<2>::from_raw(acc.price));
        result
            .column_mut("sum_disc_price")
            .expect("result schema")
            .push(Numeric::<4>::from_raw(acc.disc_price));
        result
            .column_mut("sum_charge")
            .expect("result schema")
            .push(Numeric::<6>::from_raw(acc.charge));
        result
            .column_mut("avg_qty")
            .expect("result schema")
            .push(Numeric::<2>::from_raw(acc.qty) / count);
        result
            .column_mut("avg_price")
            .expect("result schema")
            .push(Numeric::<2>::from_raw(acc.price) / count);
        result
            .column_mut("avg_disc")
            .expect("result schema")
            .push(Numeric::<2>::from_raw(acc.disc) / count);
        result.column_mut("count_order").expect("result schema").push(count);
    }
    result.nr_tuples = groups.len();
    result
}

/// Fused loop with per-thread grouping maps, merged by the reduction.
pub fn q1_compiled(db: &Database, _nr_threads: usize) -> Result<Relation> {
    let rel = db.get("lineitem")?;
    let returnflag = rel.column("l_returnflag")?.data::<Char<1>>();
    let linestatus = rel.column("l_linestatus")?.data::<Char<1>>();
    let quantity = rel.column("l_quantity")?.data::<Numeric<2>>();
    let price = rel.column("l_extendedprice")?.data::<Numeric<2>>();
    let discount = rel.column("l_discount")?.data::<Numeric<2>>();
    let tax = rel.column("l_tax")?.data::<Numeric<2>>();
    let shipdate = rel.column("l_shipdate")?.data::<Date>();

    let cutoff = Date::parse("1998-09-02")?.value;
    let one = Numeric::<2>::from(Integer::new(1)).raw();

    let groups = (0..rel.nr_tuples)
        .into_par_iter()
        .with_min_len(4096)
        .fold(HashMap::new, |mut m: HashMap<(u8, u8), Acc>, i| {
            if shipdate[i].value <= cutoff {
                let disc = discount[i].raw();
                let pr = price[i].raw();
                let disc_price = pr.wrapping_mul(one - disc);
                let acc = m.entry((returnflag[i].data[0], linestatus[i].data[0])).or_default();
                acc.qty += quantity[i].raw();
                acc.price += pr;
                acc.disc_price += disc_price;
                acc.charge += disc_price.wrapping_mul(one + tax[i].raw());
                acc.disc += disc;
                acc.count += 1;
            }
            m
        })
        .reduce(HashMap::new, merge_maps);

    Ok(result_relation(groups.into_iter().collect()))
}

struct Consts {
    cutoff: i32,
    one: i64,
}

/// Operator pipeline: Scan -> Select -> Project -> HashGroup; group rows are
/// collected per worker and the barrier leader assembles the result.
pub fn q1_vectorized(db: &Database, nr_threads: usize, conf: &EngineConfig) -> Result<Relation> {
    let rel = db.get("lineitem")?;
    assert_eq!(rel.column("l_returnflag")?.rt_size(), 2);
    assert_eq!(rel.column("l_linestatus")?.rt_size(), 2);
    assert_eq!(rel.column("l_shipdate")?.rt_size(), 4);

    let pool = Arc::new(GlobalPool::new());
    let workers = WorkerGroup::new(nr_threads);
    let shared_groups: Arc<GroupShared> = Arc::new(GroupShared::default());
    let rows = Mutex::new(Vec::new());
    let result = Mutex::new(None);

    workers.run(|| {
        with_source(&pool, || -> Result<()> {
            let consts = Box::new(Consts {
                cutoff: Date::parse("1998-09-02")?.value,
                one: Numeric::<2>::from(Integer::new(1)).raw(),
            });

            let ctx = this_worker();
            let (begin, end) = morsel_range(ctx.id, ctx.nr_workers, rel.nr_tuples);
            drop(ctx);

            let mut bufs = QueryBuffers::new(conf.vector_size);
            let mut scan = Scan::over_range(begin, end, conf.vector_size);
            let returnflag = scan.cursor(rel.column("l_returnflag")?);
            let linestatus = scan.cursor(rel.column("l_linestatus")?);
            let quantity = scan.cursor(rel.column("l_quantity")?);
            let price = scan.cursor(rel.column("l_extendedprice")?);
            let discount = scan.cursor(rel.column("l_discount")?);
            let tax = scan.cursor(rel.column("l_tax")?);
            let shipdate = scan.cursor(rel.column("l_shipdate")?);

            let sel_a = bufs.get(0, POS_SIZE)?;
            let one_minus_disc = bufs.get(1, 8)?;
            let price_dense = bufs.get(2, 8)?;
            let disc_price = bufs.get(3, 8)?;
            let one_plus_tax = bufs.get(4, 8)?;
            let charge = bufs.get(5, 8)?;
            let out_rf = bufs.get(6, 2)?;
            let out_ls = bufs.get(7, 2)?;
            let out_aggs: Vec<_> = (8u32..14)
                .map(|id| bufs.get(id, 8))
                .collect::<Result<_>>()?;

            let select_expr = Expression::new().add_f3(
                conf.sel_less_equal_i32_col_val(),
                Operand::Buffer(sel_a),
                Operand::Column(shipdate),
                val(&consts.cutoff),
            );

            let project_expr = Expression::new()
                .add_f4(
                    conf.proj_sel_minus_i64_val_col(),
                    Operand::Buffer(sel_a),
                    Operand::Buffer(one_minus_disc),
                    val(&consts.one),
                    Operand::Column(discount.clone()),
                )
                .add_f3(
                    conf.gather_sel_i64_col(),
                    Operand::Buffer(price_dense),
                    Operand::Buffer(sel_a),
                    Operand::Column(price.clone()),
                )
                .add_f3(
                    conf.proj_multiplies_i64_col_col(),
                    Operand::Buffer(disc_price),
                    Operand::Buffer(price_dense),
                    Operand::Buffer(one_minus_disc),
                )
                .add_f4(
                    conf.proj_sel_plus_i64_col_val(),
                    Operand::Buffer(sel_a),
                    Operand::Buffer(one_plus_tax),
                    Operand::Column(tax),
                    val(&consts.one),
                )
                .add_f3(
                    conf.proj_multiplies_i64_col_col(),
                    Operand::Buffer(charge),
                    Operand::Buffer(disc_price),
                    Operand::Buffer(one_plus_tax),
                );

            let select = Select::new(Box::new(scan), select_expr);
            let project = crate::vectorized::Project::new(Box::new(select), project_expr);

            let mut group = HashGroup::new(
                Box::new(project),
                vec![
                    Access::Column { cursor: returnflag, size: 2 },
                    Access::Column { cursor: linestatus, size: 2 },
                ],
                Some(sel_a),
                vec![
                    Aggr::SumI64(Access::Column { cursor: quantity, size: 8 }),
                    Aggr::SumI64(Access::Column { cursor: price, size: 8 }),
                    Aggr::SumI64(Access::Buffer { buf: disc_price, size: 8 }),
                    Aggr::SumI64(Access::Buffer { buf: charge, size: 8 }),
                    Aggr::SumI64(Access::Column { cursor: discount, size: 8 }),
                    Aggr::CountStar,
                ],
                vec![out_rf, out_ls],
                out_aggs.clone(),
                conf.vector_size,
                shared_groups.clone(),
            );

            let mut local_rows = Vec::new();
            loop {
                let n = group.next()?;
                if n == 0 {
                    break;
                }
                for i in 0..n {
                    unsafe {
                        let rf = *out_rf.as_ptr::<u8>().add(i * 2 + 1);
                        let ls = *out_ls.as_ptr::<u8>().add(i * 2 + 1);
                        let acc = Acc {
                            qty: out_aggs[0].read::<i64>(i),
                            price: out_aggs[1].read::<i64>(i),
                            disc_price: out_aggs[2].read::<i64>(i),
                            charge: out_aggs[3].read::<i64>(i),
                            disc: out_aggs[4].read::<i64>(i),
                            count: out_aggs[5].read::<i64>(i),
                        };
                        local_rows.push(((rf, ls), acc));
                    }
                }
            }
            rows.lock().append(&mut local_rows);

            if barrier() {
                let collected = std::mem::take(&mut *rows.lock());
                *result.lock() = Some(result_relation(collected));
            }
            Ok(())
        })
    })?;

    let relation = result.into_inner().expect("barrier leader wrote the result");
    Ok(relation)
}
