//! TPC-H benchmark driver.
//!
//! Imports `.tbl` files from a directory and runs the shipped queries with
//! either engine, timing each repetition:
//!
//! ```text
//! olap-bench -p <tbl dir> [-q 1|3|6] [-e h|v] [-r reps] [-t threads] [-v vectorSize]
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use rusty_olap::queries::{q1_compiled, q1_vectorized, q3_compiled, q3_vectorized, q6_compiled, q6_vectorized};
use rusty_olap::storage::{import_tpch, Database, Relation};
use rusty_olap::vectorized::EngineConfig;
use rusty_olap::Result;

struct Options {
    path: PathBuf,
    query: Option<String>,
    engine: Option<String>,
    repetitions: usize,
    nr_threads: usize,
    vector_size: usize,
}

fn usage(program: &str) -> String {
    format!("Usage: {program} -p <path> [-q query] [-e engine] [-r reps] [-t threads] [-v vSize]")
}

fn parse_args() -> std::result::Result<Options, String> {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "olap-bench".into());
    let mut path = None;
    let mut query = None;
    let mut engine = None;
    let mut repetitions = 1usize;
    let mut nr_threads = num_cpus::get();
    let mut vector_size = 1024usize;

    while let Some(flag) = args.next() {
        let mut value = |name: &str| {
            args.next().ok_or_else(|| format!("missing value for {name}\n{}", usage(&program)))
        };
        match flag.as_str() {
            "-p" => path = Some(PathBuf::from(value("-p")?)),
            "-q" => query = Some(value("-q")?),
            "-e" => engine = Some(value("-e")?),
            "-r" => {
                repetitions = value("-r")?
                    .parse()
                    .map_err(|_| "invalid repetition count".to_string())?
            }
            "-t" => {
                nr_threads = value("-t")?
                    .parse()
                    .map_err(|_| "invalid thread count".to_string())?
            }
            "-v" => {
                vector_size = value("-v")?
                    .parse()
                    .map_err(|_| "invalid vector size".to_string())?
            }
            other => return Err(format!("unknown flag '{other}'\n{}", usage(&program))),
        }
    }

    let path = path.ok_or_else(|| {
        format!("Error: Path to TPC-H directory (-p) is required.\n{}", usage(&program))
    })?;
    Ok(Options { path, query, engine, repetitions, nr_threads, vector_size })
}

fn selected_runs(opts: &Options) -> BTreeSet<String> {
    let all: BTreeSet<String> = ["1h", "1v", "3h", "3v", "6h", "6v"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    match (&opts.query, &opts.engine) {
        (Some(q), Some(e)) => all.into_iter().filter(|r| *r == format!("{q}{e}")).collect(),
        (Some(q), None) => all.into_iter().filter(|r| r.starts_with(q.as_str())).collect(),
        (None, Some(e)) => all.into_iter().filter(|r| r.ends_with(e.as_str())).collect(),
        (None, None) => all,
    }
}

fn time_query<F>(name: &str, repetitions: usize, mut f: F) -> Result<()>
where
    F: FnMut() -> Result<Relation>,
{
    for _ in 0..repetitions {
        let start = Instant::now();
        let result = f()?;
        let elapsed = start.elapsed();
        println!(
            "{name:<14} {:>10.3} ms   {} row(s)",
            elapsed.as_secs_f64() * 1e3,
            result.nr_tuples
        );
    }
    Ok(())
}

fn run(opts: &Options) -> Result<()> {
    let mut db = Database::new();
    import_tpch(&opts.path, &mut db)?;

    let conf = EngineConfig { vector_size: opts.vector_size, ..Default::default() };
    let runs = selected_runs(opts);
    if runs.is_empty() {
        return Err(rusty_olap::DbError::InvalidArgument(format!(
            "no runnable query for -q {:?} -e {:?} (shipped: 1, 3, 6; engines: h, v)",
            opts.query, opts.engine
        )));
    }
    eprintln!(
        "Engine: {} | Query: {} | Threads: {} | VectorSize: {}",
        opts.engine.as_deref().unwrap_or("all"),
        opts.query.as_deref().unwrap_or("all"),
        opts.nr_threads,
        opts.vector_size
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.nr_threads)
        .build()
        .map_err(|e| rusty_olap::DbError::Resource(e.to_string()))?;

    for r in runs {
        match r.as_str() {
            "1h" => time_query("q1 compiled", opts.repetitions, || {
                pool.install(|| q1_compiled(&db, opts.nr_threads))
            })?,
            "1v" => time_query("q1 vectorized", opts.repetitions, || {
                q1_vectorized(&db, opts.nr_threads, &conf)
            })?,
            "3h" => time_query("q3 compiled", opts.repetitions, || {
                pool.install(|| q3_compiled(&db, opts.nr_threads))
            })?,
            "3v" => time_query("q3 vectorized", opts.repetitions, || {
                q3_vectorized(&db, opts.nr_threads, &conf)
            })?,
            "6h" => time_query("q6 compiled", opts.repetitions, || {
                pool.install(|| q6_compiled(&db, opts.nr_threads))
            })?,
            "6v" => time_query("q6 vectorized", opts.repetitions, || {
                q6_vectorized(&db, opts.nr_threads, &conf)
            })?,
            _ => unreachable!("selected_runs filters to known keys"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
