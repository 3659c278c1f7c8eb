// TPC-H `.tbl` importer. Each table is a '|'-separated text file; fields are
// parsed by the scalar cast routines and appended column-at-a-time. Missing
// table files are an error only for tables the caller asked for.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::error::{DbError, Result};
use crate::storage::{Database, Relation};
use crate::types::{Date, Integer, Numeric, ScalarKind};

use crate::types::ScalarKind::{
    Char, Date as DateKind, Integer as IntKind, Numeric as NumKind, Varchar,
};

const TPCH_TABLES: &[(&str, &[(&str, ScalarKind)])] = &[
    (
        "lineitem",
        &[
            ("l_orderkey", IntKind),
            ("l_partkey", IntKind),
            ("l_suppkey", IntKind),
            ("l_linenumber", IntKind),
            ("l_quantity", NumKind(2)),
            ("l_extendedprice", NumKind(2)),
            ("l_discount", NumKind(2)),
            ("l_tax", NumKind(2)),
            ("l_returnflag", Char(1)),
            ("l_linestatus", Char(1)),
            ("l_shipdate", DateKind),
            ("l_commitdate", DateKind),
            ("l_receiptdate", DateKind),
            ("l_shipinstruct", Char(25)),
            ("l_shipmode", Char(10)),
            ("l_comment", Varchar(44)),
        ],
    ),
    (
        "orders",
        &[
            ("o_orderkey", IntKind),
            ("o_custkey", IntKind),
            ("o_orderstatus", Char(1)),
            ("o_totalprice", NumKind(2)),
            ("o_orderdate", DateKind),
            ("o_orderpriority", Char(15)),
            ("o_clerk", Char(15)),
            ("o_shippriority", IntKind),
            ("o_comment", Varchar(79)),
        ],
    ),
    (
        "customer",
        &[
            ("c_custkey", IntKind),
            ("c_name", Varchar(25)),
            ("c_address", Varchar(40)),
            ("c_nationkey", IntKind),
            ("c_phone", Char(15)),
            ("c_acctbal", NumKind(2)),
            ("c_mktsegment", Char(10)),
            ("c_comment", Varchar(117)),
        ],
    ),
    (
        "part",
        &[
            ("p_partkey", IntKind),
            ("p_name", Varchar(55)),
            ("p_mfgr", Char(25)),
            ("p_brand", Char(10)),
            ("p_type", Varchar(25)),
            ("p_size", IntKind),
            ("p_container", Char(10)),
            ("p_retailprice", NumKind(2)),
            ("p_comment", Varchar(23)),
        ],
    ),
    (
        "supplier",
        &[
            ("s_suppkey", IntKind),
            ("s_name", Char(25)),
            ("s_address", Varchar(40)),
            ("s_nationkey", IntKind),
            ("s_phone", Char(15)),
            ("s_acctbal", NumKind(2)),
            ("s_comment", Varchar(101)),
        ],
    ),
    (
        "partsupp",
        &[
            ("ps_partkey", IntKind),
            ("ps_suppkey", IntKind),
            ("ps_availqty", IntKind),
            ("ps_supplycost", NumKind(2)),
            ("ps_comment", Varchar(199)),
        ],
    ),
    (
        "nation",
        &[
            ("n_nationkey", IntKind),
            ("n_name", Char(25)),
            ("n_regionkey", IntKind),
            ("n_comment", Varchar(152)),
        ],
    ),
    (
        "region",
        &[
            ("r_regionkey", IntKind),
            ("r_name", Char(25)),
            ("r_comment", Varchar(152)),
        ],
    ),
];

/// Import every TPC-H table found in `dir` (files named `<table>.tbl`).
pub fn import_tpch(dir: &Path, db: &mut Database) -> Result<()> {
    for (table, schema) in TPCH_TABLES {
        let path = dir.join(format!("{table}.tbl"));
        if !path.exists() {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("missing table file {}", path.display()),
            )));
        }
        let rel = import_table(&path, table, schema)?;
        info!(table, tuples = rel.nr_tuples, "imported");
        db.insert(rel);
    }
    Ok(())
}

fn import_table(path: &Path, table: &str, schema: &[(&str, ScalarKind)]) -> Result<Relation> {
    let mut rel = Relation::new(table);
    for (name, kind) in schema {
        rel.insert(*name, *kind);
    }

    let reader = BufReader::new(File::open(path)?);
    let mut tuples = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('|');
        for (ci, (name, kind)) in schema.iter().enumerate() {
            let field = fields.next().ok_or_else(|| {
                DbError::Parse(format!(
                    "{table}.tbl:{}: missing field '{name}'",
                    line_no + 1
                ))
            })?;
            append_field(rel.column_mut_at(ci), *kind, field).map_err(|e| {
                DbError::Parse(format!("{table}.tbl:{}: {name}: {e}", line_no + 1))
            })?;
        }
        tuples += 1;
    }
    rel.nr_tuples = tuples;
    Ok(rel)
}

fn append_field(col: &mut crate::storage::Column, kind: ScalarKind, field: &str) -> Result<()> {
    match kind {
        ScalarKind::Integer => col.push(Integer::parse(field)?),
        ScalarKind::Numeric(2) => col.push(Numeric::<2>::parse(field)?),
        ScalarKind::Numeric(p) => {
            return Err(DbError::Parse(format!("unsupported import precision {p}")))
        }
        ScalarKind::Date => col.push(Date::parse(field)?),
        ScalarKind::Timestamp => {
            col.push(crate::types::Timestamp::parse(field)?)
        }
        ScalarKind::Char(n) => {
            let trimmed = field.trim_start_matches(' ');
            if trimmed.len() > n as usize {
                return Err(DbError::Parse(format!(
                    "value '{field}' exceeds char({n})"
                )));
            }
            col.push_str_cell(trimmed.as_bytes());
        }
        ScalarKind::Varchar(n) => {
            if field.len() > n as usize {
                return Err(DbError::Parse(format!(
                    "value '{field}' exceeds varchar({n})"
                )));
            }
            col.push_str_cell(field.as_bytes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Char as CharVal;

    fn write_tbl(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn imports_a_small_lineitem() {
        let dir = std::env::temp_dir().join(format!("olap-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        write_tbl(
            &dir,
            "lineitem.tbl",
            "1|155|7706|1|17|21168.23|0.04|0.02|N|O|1996-03-13|1996-02-12|1996-03-22|DELIVER IN PERSON|TRUCK|egular courts above the|\n",
        );

        let schema = TPCH_TABLES
            .iter()
            .find(|(t, _)| *t == "lineitem")
            .map(|(_, s)| *s)
            .unwrap();
        let rel = import_table(&dir.join("lineitem.tbl"), "lineitem", schema).unwrap();
        assert_eq!(rel.nr_tuples, 1);
        assert_eq!(rel.column("l_orderkey").unwrap().get::<Integer>(0).value, 1);
        assert_eq!(
            rel.column("l_extendedprice").unwrap().get::<Numeric<2>>(0).raw(),
            2_116_823
        );
        assert_eq!(
            rel.column("l_returnflag").unwrap().get::<CharVal<1>>(0).as_str(),
            "N"
        );
        assert_eq!(
            rel.column("l_shipdate").unwrap().get::<Date>(0),
            Date::parse("1996-03-13").unwrap()
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn malformed_field_is_a_parse_error() {
        let dir = std::env::temp_dir().join(format!("olap-import-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        write_tbl(&dir, "region.tbl", "0|AFRICA|not-much-to-say|\n1|x|y\nbad|row|\n");
        let schema = TPCH_TABLES
            .iter()
            .find(|(t, _)| *t == "region")
            .map(|(_, s)| *s)
            .unwrap();
        let err = import_table(&dir.join("region.tbl"), "region", schema).unwrap_err();
        assert!(matches!(err, DbError::Parse(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
