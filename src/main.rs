use std::error::Error;

use clap::Parser;
use log::{debug, error};

mod args;
mod ingest;

use crate::args::{Args, Command};
use crate::ingest::{BIngestResult, IngestSettings, StoreSettings};

fn run(args: Args) -> BIngestResult<()> {
    let store = StoreSettings::new(args.connection, args.schema)?;
    match args.command {
        Command::Ingest {
            input,
            instrument,
            input_type,
            excel_worksheet_name,
            check_header,
            replace,
        } => {
            let settings = IngestSettings::new(
                store,
                input,
                instrument,
                input_type,
                excel_worksheet_name,
                check_header,
                replace,
            )?;
            debug!("settings: {:?}", settings);
            ingest::run_ingest(&settings)?;
        }
        Command::LoadCatalog { catalog } => {
            ingest::run_load_catalog(&store, &catalog)?;
        }
        Command::LoadCategories { categories } => {
            ingest::run_load_categories(&store, &categories)?;
        }
        Command::Report {
            out,
            reference,
            top_words,
        } => ingest::run_report(&store, out, reference, top_words)?,
    }
    Ok(())
}

fn main() {
    // Settings may come from a .env file in the working directory.
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }
    debug!("args: {:?}", args);

    if let Err(e) = run(args) {
        error!("{}", e);
        let mut source = e.source();
        while let Some(s) = source {
            error!("  caused by: {}", s);
            source = s.source();
        }
        std::process::exit(1);
    }
}
