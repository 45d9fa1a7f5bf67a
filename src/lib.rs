pub mod cli;
pub mod error;
pub mod headers;
pub mod io_utils;
pub mod join;
pub mod load;
pub mod normalize;
pub mod schema;
pub mod store;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    headers::{CompareOptions, HeaderStatus},
    join::JoinSpec,
    load::{KeySequence, LoadOptions},
    normalize::NormalizeOptions,
};

pub use error::PrepError;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("data_prep", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Headers(args) => handle_headers(&args),
        Commands::Normalize(args) => handle_normalize(&args),
        Commands::Load(args) => handle_load(&args),
        Commands::Join(args) => handle_join(&args),
    }
}

fn handle_headers(args: &cli::HeadersArgs) -> Result<()> {
    info!(
        "Comparing headers in '{}' (extension '{}', delimiter '{}')",
        args.input.display(),
        args.extension,
        io_utils::printable_delimiter(args.delimiter)
    );
    let options = CompareOptions {
        correct_header: args.header.clone(),
        header_delimiter: args.header_delimiter.clone(),
        file_extension: args.extension.clone(),
        file_delimiter: args.delimiter,
        encoding: args.input_encoding.clone(),
        result_format: args.format,
    };
    let results = headers::compare_headers(&args.input, &args.output, &options)
        .with_context(|| format!("Comparing headers in {:?}", args.input))?;
    for result in results
        .iter()
        .filter(|r| r.status == HeaderStatus::Incorrect)
    {
        info!(
            "{}: missing [{}], unexpected [{}]",
            result.file,
            result.missing_display(),
            result.excess_display()
        );
    }
    Ok(())
}

fn handle_normalize(args: &cli::NormalizeArgs) -> Result<()> {
    info!(
        "Normalizing '{}' -> '{}'",
        args.input.display(),
        args.output.display()
    );
    let options = NormalizeOptions {
        delimiter: args.delimiter,
        chunk_size: args.chunk_size,
    };
    normalize::normalize_directory(&args.input, &args.output, &options)
        .with_context(|| format!("Normalizing files in {:?}", args.input))?;
    Ok(())
}

fn handle_load(args: &cli::LoadArgs) -> Result<()> {
    let options = LoadOptions {
        primary_key: args.primary_key.clone(),
        identifier_column: args.id_column.clone(),
        surrogate_key_column: args.key_column.clone(),
        key_sequence: if args.global_primary_key {
            KeySequence::Global
        } else {
            KeySequence::PerFile
        },
        column_types: args.column_types.clone(),
    };
    let summary = load::load_directory_to_table(&args.input, &args.db, &args.table, &options)
        .with_context(|| format!("Loading {:?} into table '{}'", args.input, args.table))?;
    if summary.created {
        info!("Table '{}' created in {:?}", summary.table, args.db);
    }
    Ok(())
}

fn handle_join(args: &cli::JoinArgs) -> Result<()> {
    let spec = JoinSpec {
        left_table: args.left.clone(),
        right_table: args.right.clone(),
        output_table: args.output.clone(),
        join_key: args.key.clone(),
        origin_column: args.origin_column.clone(),
    };
    join::join_tables(&args.db, &spec)
        .with_context(|| format!("Joining tables in {:?}", args.db))?;
    Ok(())
}
