// Full TPC-H validation, gated on a real dataset. Point TPCH_PATH at a
// directory of SF-1 `.tbl` files and run with `cargo test -- --ignored`.

use rusty_olap::queries::{q6_compiled, q6_vectorized};
use rusty_olap::storage::{import_tpch, Database};
use rusty_olap::types::Numeric;
use rusty_olap::vectorized::EngineConfig;

#[test]
#[ignore = "needs TPCH_PATH pointing at SF-1 .tbl files"]
fn q6_sf1_revenue() {
    let path = std::env::var("TPCH_PATH").expect("set TPCH_PATH to the SF-1 tbl directory");
    let mut db = Database::new();
    import_tpch(std::path::Path::new(&path), &mut db).unwrap();

    let expected = Numeric::<4>::parse("123141147.1752").unwrap().raw();

    let compiled = q6_compiled(&db, num_cpus::get()).unwrap();
    assert_eq!(compiled.column("revenue").unwrap().get::<Numeric<4>>(0).raw(), expected);

    let conf = EngineConfig { vector_size: 1024, ..Default::default() };
    let vectorized = q6_vectorized(&db, num_cpus::get(), &conf).unwrap();
    assert_eq!(
        vectorized.column("revenue").unwrap().get::<Numeric<4>>(0).raw(),
        expected
    );
}
