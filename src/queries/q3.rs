// TPC-H Q3: shipping priority.
//
//   select l_orderkey, sum(l_extendedprice * (1 - l_discount)) as revenue,
//          o_orderdate, o_shippriority
//   from customer, orders, lineitem
//   where c_mktsegment = 'BUILDING' and c_custkey = o_custkey
//     and l_orderkey = o_orderkey and o_orderdate < '1995-03-15'
//     and l_shipdate > '1995-03-15'
//   group by l_orderkey, o_orderdate, o_shippriority
//   order by revenue desc, o_orderdate
//   limit 10
//
// The vectorized plan chains two hash joins: customer (build) against
// orders (probe), whose output feeds the build side of the join with
// lineitem. Order date and ship priority travel as join payload.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::Result;
use crate::queries::{val, POS_SIZE};
use crate::runtime::{
    barrier, morsel_range, this_worker, with_source, GlobalPool, SharedStateManager, WorkerGroup,
};
use crate::storage::{Database, Relation};
use crate::types::{Char, Date, Integer, Numeric, ScalarKind};
use crate::vectorized::{
    primitives::select::sel_equal_col_val, Access, Aggr, BuildSide, EngineConfig, Expression,
    GroupShared, HashGroup, Hashjoin, JoinShared, Operand, Operator, ProbeSide, Project,
    QueryBuffers, Scan, Select,
};

type GroupRow = (i32, i32, i32, i64);

fn result_relation(mut rows: Vec<GroupRow>) -> Relation {
    // revenue desc, order date asc, top 10
    rows.sort_by(|a, b| b.3.cmp(&a.3).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0)));
    rows.truncate(10);

    let mut result = Relation::new("q3");
    result.insert("l_orderkey", ScalarKind::Integer);
    result.insert("revenue", ScalarKind::Numeric(4));
    result.insert("o_orderdate", ScalarKind::Date);
    result.insert("o_shippriority", ScalarKind::Integer);
    for (orderkey, orderdate, shippriority, revenue) in &rows {
        result
            .column_mut("l_orderkey")
            .expect("result schema")
            .push(Integer::new(*orderkey));
        result
            .column_mut("revenue")
            .expect("result schema")
            .push(Numeric::<4>::from_raw(*revenue));
        result
            .column_mut("o_orderdate")
            .expect("result schema")
            .push(Date::new(*orderdate));
        result
            .column_mut("o_shippriority")
            .expect("result schema")
            .push(Integer::new(*shippriority));
    }
    result.nr_tuples = rows.len();
    result
}

/// Fused loops: two parallel map builds, then a parallel grouped scan of
/// lineitem.
pub fn q3_compiled(db: &Database, _nr_threads: usize) -> Result<Relation> {
    let customer = db.get("customer")?;
    let orders = db.get("orders")?;
    let lineitem = db.get("lineitem")?;

    let cutoff = Date::parse("1995-03-15")?.value;
    let building = Char::<10>::parse("BUILDING")?;
    let one = Numeric::<2>::from(Integer::new(1)).raw();

    let c_custkey = customer.column("c_custkey")?.data::<Integer>();
    let c_mktsegment = customer.column("c_mktsegment")?.data::<Char<10>>();
    let builders: HashSet<i32> = (0..customer.nr_tuples)
        .into_par_iter()
        .with_min_len(4096)
        .fold(HashSet::new, |mut s: HashSet<i32>, i| {
            if c_mktsegment[i] == building {
                s.insert(c_custkey[i].value);
            }
            s
        })
        .reduce(HashSet::new, |mut a, b| {
            a.extend(b);
            a
        });

    let o_orderkey = orders.column("o_orderkey")?.data::<Integer>();
    let o_custkey = orders.column("o_custkey")?.data::<Integer>();
    let o_orderdate = orders.column("o_orderdate")?.data::<Date>();
    let o_shippriority = orders.column("o_shippriority")?.data::<Integer>();
    let open_orders: HashMap<i32, (i32, i32)> = (0..orders.nr_tuples)
        .into_par_iter()
        .with_min_len(4096)
        .fold(HashMap::new, |mut m: HashMap<i32, (i32, i32)>, i| {
            if o_orderdate[i].value < cutoff && builders.contains(&o_custkey[i].value) {
                m.insert(o_orderkey[i].value, (o_orderdate[i].value, o_shippriority[i].value));
            }
            m
        })
        .reduce(HashMap::new, |mut a, b| {
            a.extend(b);
            a
        });

    let l_orderkey = lineitem.column("l_orderkey")?.data::<Integer>();
    let l_shipdate = lineitem.column("l_shipdate")?.data::<Date>();
    let l_price = lineitem.column("l_extendedprice")?.data::<Numeric<2>>();
    let l_discount = lineitem.column("l_discount")?.data::<Numeric<2>>();
    let groups = (0..lineitem.nr_tuples)
        .into_par_iter()
        .with_min_len(4096)
        .fold(HashMap::new, |mut m: HashMap<(i32, i32, i32), i64>, i| {
            if l_shipdate[i].value > cutoff {
                if let Some(&(date, prio)) = open_orders.get(&l_orderkey[i].value) {
                    let revenue = l_price[i].raw().wrapping_mul(one - l_discount[i].raw());
                    *m.entry((l_orderkey[i].value, date, prio)).or_insert(0) += revenue;
                }
            }
            m
        })
        .reduce(HashMap::new, |mut a, b| {
            for (k, v) in b {
                *a.entry(k).or_insert(0) += v;
            }
            a
        });

    let rows = groups
        .into_iter()
        .map(|((orderkey, date, prio), revenue)| (orderkey, date, prio, revenue))
        .collect();
    Ok(result_relation(rows))
}

struct Consts {
    cutoff: i32,
    one: i64,
    building: Char<10>,
}

/// Operator pipeline with two chained hash joins and a hash group, one
/// morsel of each base table per worker.
pub fn q3_vectorized(db: &Database, nr_threads: usize, conf: &EngineConfig) -> Result<Relation> {
    let customer = db.get("customer")?;
    let orders = db.get("orders")?;
    let lineitem = db.get("lineitem")?;
    assert_eq!(customer.column("c_mktsegment")?.rt_size(), 11);
    assert_eq!(orders.column("o_orderdate")?.rt_size(), 4);
    assert_eq!(lineitem.column("l_orderkey")?.rt_size(), 4);

    let pool = Arc::new(GlobalPool::new());
    let workers = WorkerGroup::new(nr_threads);
    let shared = SharedStateManager::new();
    let rows: Mutex<Vec<GroupRow>> = Mutex::new(Vec::new());
    let result = Mutex::new(None);

    workers.run(|| {
        with_source(&pool, || -> Result<()> {
            let consts = Box::new(Consts {
                cutoff: Date::parse("1995-03-15")?.value,
                one: Numeric::<2>::from(Integer::new(1)).raw(),
                building: Char::<10>::parse("BUILDING")?,
            });

            let ctx = this_worker();
            let (tid, nr) = (ctx.id, ctx.nr_workers);
            drop(ctx);
            let mut bufs = QueryBuffers::new(conf.vector_size);

            // customer pipeline: build side of the first join
            let (c_begin, c_end) = morsel_range(tid, nr, customer.nr_tuples);
            let mut scan_c = Scan::over_range(c_begin, c_end, conf.vector_size);
            let c_custkey = scan_c.cursor(customer.column("c_custkey")?);
            let c_mktsegment = scan_c.cursor(customer.column("c_mktsegment")?);
            let sel_c = bufs.get(0, POS_SIZE)?;
            let select_c = Select::new(
                Box::new(scan_c),
                Expression::new().add_f3(
                    sel_equal_col_val::<Char<10>>,
                    Operand::Buffer(sel_c),
                    Operand::Column(c_mktsegment),
                    val(&consts.building),
                ),
            );
            let build1_hashes = bufs.get(1, 8)?;
            let build1 = BuildSide {
                child: Box::new(select_c),
                hash_expr: Expression::new().add_f3(
                    conf.hash_sel_i32_col(),
                    Operand::Buffer(build1_hashes),
                    Operand::Buffer(sel_c),
                    Operand::Column(c_custkey.clone()),
                ),
                hashes: build1_hashes,
                sel: Some(sel_c),
                keys: vec![Access::Column { cursor: c_custkey, size: 4 }],
                payload: vec![],
            };

            // orders pipeline: probe of the first join, build of the second
            let (o_begin, o_end) = morsel_range(tid, nr, orders.nr_tuples);
            let mut scan_o = Scan::over_range(o_begin, o_end, conf.vector_size);
            let o_orderkey = scan_o.cursor(orders.column("o_orderkey")?);
            let o_custkey = scan_o.cursor(orders.column("o_custkey")?);
            let o_orderdate = scan_o.cursor(orders.column("o_orderdate")?);
            let o_shippriority = scan_o.cursor(orders.column("o_shippriority")?);
            let sel_o = bufs.get(2, POS_SIZE)?;
            let select_o = Select::new(
                Box::new(scan_o),
                Expression::new().add_f3(
                    conf.sel_less_i32_col_val(),
                    Operand::Buffer(sel_o),
                    Operand::Column(o_orderdate.clone()),
                    val(&consts.cutoff),
                ),
            );
            let probe1_hashes = bufs.get(3, 8)?;
            let probe1 = ProbeSide {
                child: Box::new(select_o),
                hash_expr: Expression::new().add_f3(
                    conf.hash_sel_i32_col(),
                    Operand::Buffer(probe1_hashes),
                    Operand::Buffer(sel_o),
                    Operand::Column(o_custkey.clone()),
                ),
                hashes: probe1_hashes,
                sel: Some(sel_o),
                keys: vec![Access::Column { cursor: o_custkey, size: 4 }],
            };
            let hj1_sel = bufs.get(4, POS_SIZE)?;
            let hj1_entries = bufs.get(5, 8)?;
            let hj1 = Hashjoin::new(
                build1,
                probe1,
                hj1_sel,
                hj1_entries,
                conf.join_algo(),
                conf.vector_size,
                shared.get_or_init::<JoinShared>(0),
            );

            // second join: orders-that-matched build lineitem probe
            let build2_hashes = bufs.get(6, 8)?;
            let build2 = BuildSide {
                child: Box::new(hj1),
                hash_expr: Expression::new().add_f3(
                    conf.hash_sel_i32_col(),
                    Operand::Buffer(build2_hashes),
                    Operand::Buffer(hj1_sel),
                    Operand::Column(o_orderkey.clone()),
                ),
                hashes: build2_hashes,
                sel: Some(hj1_sel),
                keys: vec![Access::Column { cursor: o_orderkey, size: 4 }],
                payload: vec![
                    Access::Column { cursor: o_orderdate, size: 4 },
                    Access::Column { cursor: o_shippriority, size: 4 },
                ],
            };

            let (l_begin, l_end) = morsel_range(tid, nr, lineitem.nr_tuples);
            let mut scan_l = Scan::over_range(l_begin, l_end, conf.vector_size);
            let l_orderkey = scan_l.cursor(lineitem.column("l_orderkey")?);
            let l_shipdate = scan_l.cursor(lineitem.column("l_shipdate")?);
            let l_price = scan_l.cursor(lineitem.column("l_extendedprice")?);
            let l_discount = scan_l.cursor(lineitem.column("l_discount")?);
            let sel_l = bufs.get(7, POS_SIZE)?;
            let select_l = Select::new(
                Box::new(scan_l),
                Expression::new().add_f3(
                    conf.sel_greater_i32_col_val(),
                    Operand::Buffer(sel_l),
                    Operand::Column(l_shipdate),
                    val(&consts.cutoff),
                ),
            );
            let probe2_hashes = bufs.get(8, 8)?;
            let probe2 = ProbeSide {
                child: Box::new(select_l),
                hash_expr: Expression::new().add_f3(
                    conf.hash_sel_i32_col(),
                    Operand::Buffer(probe2_hashes),
                    Operand::Buffer(sel_l),
                    Operand::Column(l_orderkey.clone()),
                ),
                hashes: probe2_hashes,
                sel: Some(sel_l),
                keys: vec![Access::Column { cursor: l_orderkey.clone(), size: 4 }],
            };
            let hj2_sel = bufs.get(9, POS_SIZE)?;
            let hj2_entries = bufs.get(10, 8)?;
            let hj2 = Hashjoin::new(
                build2,
                probe2,
                hj2_sel,
                hj2_entries,
                conf.join_algo(),
                conf.vector_size,
                shared.get_or_init::<JoinShared>(1),
            );

            // revenue = l_extendedprice * (1 - l_discount), dense per match
            let one_minus_disc = bufs.get(11, 8)?;
            let price_dense = bufs.get(12, 8)?;
            let revenue = bufs.get(13, 8)?;
            let project = Project::new(
                Box::new(hj2),
                Expression::new()
                    .add_f4(
                        conf.proj_sel_minus_i64_val_col(),
                        Operand::Buffer(hj2_sel),
                        Operand::Buffer(one_minus_disc),
                        val(&consts.one),
                        Operand::Column(l_discount),
                    )
                    .add_f3(
                        conf.gather_sel_i64_col(),
                        Operand::Buffer(price_dense),
                        Operand::Buffer(hj2_sel),
                        Operand::Column(l_price),
                    )
                    .add_f3(
                        conf.proj_multiplies_i64_col_col(),
                        Operand::Buffer(revenue),
                        Operand::Buffer(price_dense),
                        Operand::Buffer(one_minus_disc),
                    ),
            );

            let out_orderkey = bufs.get(14, 4)?;
            let out_orderdate = bufs.get(15, 4)?;
            let out_prio = bufs.get(16, 4)?;
            let out_revenue = bufs.get(17, 8)?;
            let mut group = HashGroup::new(
                Box::new(project),
                vec![
                    Access::Column { cursor: l_orderkey, size: 4 },
                    Access::Entry { entries: hj2_entries, offset: 0, size: 4 },
                    Access::Entry { entries: hj2_entries, offset: 4, size: 4 },
                ],
                Some(hj2_sel),
                vec![Aggr::SumI64(Access::Buffer { buf: revenue, size: 8 })],
                vec![out_orderkey, out_orderdate, out_prio],
                vec![out_revenue],
                conf.vector_size,
                shared.get_or_init::<GroupShared>(2),
            );

            let mut local_rows = Vec::new();
            loop {
                let n = group.next()?;
                if n == 0 {
                    break;
                }
                for i in 0..n {
                    unsafe {
                        local_rows.push((
                            out_orderkey.read::<i32>(i),
                            out_orderdate.read::<i32>(i),
                            out_prio.read::<i32>(i),
                            out_revenue.read::<i64>(i),
                        ));
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
