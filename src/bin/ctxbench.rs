//! Times the fetch-link-save loop with a shared session and with a fresh
//! session per lookup.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use ctxbench::{
    run_test, setup_database, time_test, Config, DynamicContextProvider, RunReport,
    StaticContextProvider,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ctxbench",
    version,
    about = "Compare a shared session against a session per lookup"
)]
struct Args {
    #[arg(
        long,
        env = "CTXBENCH_CONFIG",
        value_name = "FILE",
        help = "Settings file (defaults to <config dir>/ctxbench/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        env = "CTXBENCH_CONNECTION_STRING",
        value_name = "STRING",
        help = "Override the configured connection string"
    )]
    connection_string: Option<String>,

    #[arg(long, help = "Print session counters after each timing")]
    stats: bool,

    #[arg(long, help = "Wait for Enter before exiting")]
    pause: bool,
}

fn main() {
    init_tracing();
    if let Err(err) = try_main() {
        eprintln!("ctxbench failed: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut config = Config::load(args.config)?;
    if let Some(raw) = args.connection_string.as_deref() {
        config = config.with_connection_string(raw.parse()?);
    }
    let workload = config.workload();
    info!(
        source = ?config.source(),
        connection = %config.connection_string(),
        contacts = workload.contacts,
        take = workload.take,
        "ctxbench.start"
    );

    let static_provider = StaticContextProvider::new(config.connection_string().clone());
    let dynamic_provider = DynamicContextProvider::new(config.connection_string().clone());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    setup_database(&dynamic_provider, workload.contacts, &mut out)?;

    let (report, _) = time_test("Test A - use caching", &mut out, || {
        run_test(&static_provider, workload.take)
    })?;
    if args.stats {
        print_stats(&mut out, &report)?;
    }

    let (report, _) = time_test("Test B - no caching", &mut out, || {
        run_test(&dynamic_provider, workload.take)
    })?;
    if args.stats {
        print_stats(&mut out, &report)?;
    }

    writeln!(out, "Done")?;
    out.flush()?;
    drop(out);
    static_provider.into_session().close()?;

    if args.pause {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
    }
    Ok(())
}

fn print_stats(out: &mut impl Write, report: &RunReport) -> io::Result<()> {
    let stats = &report.stats;
    writeln!(
        out,
        "    session: processed={} queries={} identity_hits={} identity_misses={} saves={} inserted={} updated={}",
        report.processed,
        stats.queries,
        stats.identity_hits,
        stats.identity_misses,
        stats.saves,
        stats.inserted,
        stats.updated,
    )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}
