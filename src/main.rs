use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use vfail::collapse::Collapsed;
use vfail::listing;
use vfail::serve;
use vfail::store::sqlite::SqliteStore;
use vfail::store::{Mode, Store};

#[derive(argh::FromArgs)]
/// result browser backend for fault-injection campaigns
struct Arguments {
    /// campaign database to browse
    #[argh(option, short = 'd')]
    db: PathBuf,

    /// result table to read, e.g. result_GenericExperimentMessage
    #[argh(option, short = 'r')]
    result_table: String,

    /// address to serve websocket clients on
    #[argh(option, short = 'l', default = r#"String::from("127.0.0.1:9001")"#)]
    listen: String,

    /// aggregation mode: full-trace, right-edge or latest-ip
    #[argh(option, default = "Mode::FullTrace")]
    mode: Mode,

    /// print the flat listing of this variant and exit
    #[argh(option)]
    dump: Option<i64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Arguments = argh::from_env();

    {
        let store = SqliteStore::open(&args.db, &args.result_table)
            .with_context(|| format!("cannot open {}", args.db.display()))?;

        let missing = store.missing_tables()?;
        if !missing.is_empty() {
            tracing::warn!("database is missing tables: {}", missing.join(", "));
        }

        if let Some(variant) = args.dump {
            return dump_listing(&store, variant, args.mode);
        }
    }

    serve::ws(&serve::Settings {
        db: args.db,
        result_table: args.result_table,
        listen: args.listen,
    })
}

fn dump_listing(store: &dyn Store, variant: i64, mode: Mode) -> anyhow::Result<()> {
    let listing = listing::asm_listing(store, variant, mode)?;

    for entry in &listing.entries {
        match entry {
            Collapsed::Item(insn) => {
                let marker = if insn.counts.is_some() { '*' } else { ' ' };
                println!("{:8x} {} {}", insn.address, marker, insn.disassembly);
            }
            Collapsed::Omitted { count, text } => {
                println!("-- omitted {} repetitions of '{}'", count, text);
            }
        }
    }

    Ok(())
}
