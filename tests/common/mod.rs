// Synthetic TPC-H-shaped data for cross-engine tests. Only the columns the
// shipped queries touch are populated; sizes and value ranges are chosen so
// every filter and join keeps and drops rows.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rusty_olap::storage::{Database, Relation};
use rusty_olap::types::{Char, Date, Integer, Numeric, ScalarKind};

const SEGMENTS: [&str; 5] = ["AUTOMOBILE", "BUILDING", "FURNITURE", "MACHINERY", "HOUSEHOLD"];

pub fn synthetic_db(seed: u64, customers: usize, orders: usize, lineitems: usize) -> Database {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut db = Database::new();

    let mut customer = Relation::new("customer");
    customer.insert("c_custkey", ScalarKind::Integer);
    customer.insert("c_mktsegment", ScalarKind::Char(10));
    for i in 0..customers {
        let seg = SEGMENTS[rng.random_range(0..SEGMENTS.len())];
        customer
            .column_mut("c_custkey")
            .unwrap()
            .push(Integer::new(i as i32 + 1));
        customer
            .column_mut("c_mktsegment")
            .unwrap()
            .push(Char::<10>::parse(seg).unwrap());
    }
    customer.nr_tuples = customers;
    db.insert(customer);

    let mut rel = Relation::new("orders");
    rel.insert("o_orderkey", ScalarKind::Integer);
    rel.insert("o_custkey", ScalarKind::Integer);
    rel.insert("o_orderdate", ScalarKind::Date);
    rel.insert("o_shippriority", ScalarKind::Integer);
    for i in 0..orders {
        // some orders reference customers that do not exist
        let custkey = rng.random_range(1..=(customers as i32 + customers as i32 / 5 + 1));
        rel.column_mut("o_orderkey").unwrap().push(Integer::new(i as i32 + 1));
        rel.column_mut("o_custkey").unwrap().push(Integer::new(custkey));
        rel.column_mut("o_orderdate")
            .unwrap()
            .push(Date::new(rng.random_range(8000..10500)));
        rel.column_mut("o_shippriority").unwrap().push(Integer::new(0));
    }
    rel.nr_tuples = orders;
    db.insert(rel);

    let mut rel = Relation::new("lineitem");
    rel.insert("l_orderkey", ScalarKind::Integer);
    rel.insert("l_quantity", ScalarKind::Numeric(2));
    rel.insert("l_extendedprice", ScalarKind::Numeric(2));
    rel.insert("l_discount", ScalarKind::Numeric(2));
    rel.insert("l_tax", ScalarKind::Numeric(2));
    rel.insert("l_returnflag", ScalarKind::Char(1));
    rel.insert("l_linestatus", ScalarKind::Char(1));
    rel.insert("l_shipdate", ScalarKind::Date);
    for _ in 0..lineitems {
        // some lineitems reference orders that do not exist
        let orderkey = rng.random_range(1..=(orders as i32 + orders as i32 / 5 + 1));
        rel.column_mut("l_orderkey").unwrap().push(Integer::new(orderkey));
        rel.column_mut("l_quantity")
            .unwrap()
            .push(Numeric::<2>::from_raw(rng.random_range(1..=50) * 100));
        rel.column_mut("l_extendedprice")
            .unwrap()
            .push(Numeric::<2>::from_raw(rng.random_range(90_000..10_500_000)));
        rel.column_mut("l_discount")
            .unwrap()
            .push(Numeric::<2>::from_raw(rng.random_range(0..=10)));
        rel.column_mut("l_tax")
            .unwrap()
            .push(Numeric::<2>::from_raw(rng.random_range(0..=8)));
        rel.column_mut("l_returnflag")
            .unwrap()
            .push(Char::<1>::parse(["A", "N", "R"][rng.random_range(0..3)]).unwrap());
        rel.column_mut("l_linestatus")
            .unwrap()
            .push(Char::<1>::parse(["F", "O"][rng.random_range(0..2)]).unwrap());
        rel.column_mut("l_shipdate")
            .unwrap()
            .push(Date::new(rng.random_range(8000..10500)));
    }
    rel.nr_tuples = lineitems;
    db.insert(rel);

    db
}

pub fn empty_lineitem_db() -> Database {
    let mut db = Database::new();
    let mut rel = Relation::new("lineitem");
    rel.insert("l_orderkey", ScalarKind::Integer);
    rel.insert("l_quantity", ScalarKind::Numeric(2));
    rel.insert("l_extendedprice", ScalarKind::Numeric(2));
    rel.insert("l_discount", ScalarKind::Numeric(2));
    rel.insert("l_tax", ScalarKind::Numeric(2));
    rel.insert("l_returnflag", ScalarKind::Char(1));
    rel.insert("l_linestatus", ScalarKind::Char(1));
    rel.insert("l_shipdate", ScalarKind::Date);
    rel.nr_tuples = 0;
    db.insert(rel);
    db
}
