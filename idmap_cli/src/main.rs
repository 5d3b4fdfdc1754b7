use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use idmap::IndexKind;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod input;

use input::Source;

fn kind_arg() -> Arg {
    Arg::new("kind")
        .long("kind")
        .short('k')
        .value_parser(clap::value_parser!(IndexKind))
        .help("Index strategy: dense or sparse. Defaults to $IDMAP_KIND, then dense")
}

fn index_arg() -> Arg {
    Arg::new("index")
        .long("index")
        .short('i')
        .required(true)
        .help("Dump file of the index, relative paths are resolved under $DATA_DIR (default data)")
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idmap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = Command::new("idmap")
        .about("Build and query id to value indices")
        .subcommand_required(true)
        .subcommand(
            Command::new("build")
                .about("Build an index from `id value` lines or a Parquet file and dump it")
                .arg(kind_arg())
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('f')
                        .default_value("-")
                        .help("Text or .parquet input, - for stdin"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .required(true)
                        .help("Dump file to write, relative paths are resolved under $DATA_DIR (default data)"),
                )
                .arg(
                    Arg::new("id-column")
                        .long("id-column")
                        .default_value("id")
                        .help("Parquet column holding the ids"),
                )
                .arg(
                    Arg::new("value-column")
                        .long("value-column")
                        .default_value("value")
                        .help("Parquet column holding the values"),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Look ids up in a dumped index")
                .arg(kind_arg())
                .arg(index_arg())
                .arg(
                    Arg::new("ids")
                        .required(true)
                        .num_args(1..)
                        .value_parser(clap::value_parser!(u64))
                        .help("Ids to look up"),
                ),
        )
        .subcommand(
            Command::new("stats")
                .about("Show size and memory use of a dumped index")
                .arg(kind_arg())
                .arg(index_arg()),
        )
        .get_matches();

    // Dispatch subcommands
    match matches.subcommand() {
        Some(("build", sub_m)) => handle_build(sub_m),
        Some(("get", sub_m)) => handle_get(sub_m),
        Some(("stats", sub_m)) => handle_stats(sub_m),
        _ => unreachable!("subcommand_required"),
    }
}

/// The `--kind` argument, else `$IDMAP_KIND`, else dense.
fn index_kind(matches: &ArgMatches) -> Result<IndexKind> {
    if let Some(kind) = matches.get_one::<IndexKind>("kind") {
        return Ok(*kind);
    }
    match std::env::var("IDMAP_KIND") {
        Ok(kind) => kind.parse().map_err(anyhow::Error::msg),
        Err(_) => Ok(IndexKind::Dense),
    }
}

/// Resolves relative paths under `$DATA_DIR`, `data` when unset.
fn data_path(path: &str) -> PathBuf {
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    resolve_under(&data_dir, path)
}

fn resolve_under(data_dir: &str, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_relative() {
        Path::new(data_dir).join(path)
    } else {
        path.to_path_buf()
    }
}

fn handle_build(matches: &ArgMatches) -> Result<()> {
    let kind = index_kind(matches)?;
    let input: &String = matches.get_one::<String>("input").unwrap();
    let output = data_path(matches.get_one::<String>("output").unwrap());
    let id_column: &String = matches.get_one::<String>("id-column").unwrap();
    let value_column: &String = matches.get_one::<String>("value-column").unwrap();

    let source = Source::detect(input, id_column, value_column);
    let stats = commands::build(kind, &source, &output)?;
    println!(
        "Wrote {} index with {} records to {}",
        kind,
        stats.records,
        output.display()
    );
    Ok(())
}

fn handle_get(matches: &ArgMatches) -> Result<()> {
    let kind = index_kind(matches)?;
    let path = data_path(matches.get_one::<String>("index").unwrap());
    let ids: Vec<u64> = matches.get_many::<u64>("ids").unwrap().copied().collect();

    let index = commands::open(kind, &path)?;
    for (id, value) in commands::lookup(&index, &ids) {
        match value {
            Some(value) => println!("{id}\t{value}"),
            None => println!("{id}\tnot found"),
        }
    }
    Ok(())
}

fn handle_stats(matches: &ArgMatches) -> Result<()> {
    let kind = index_kind(matches)?;
    let path = data_path(matches.get_one::<String>("index").unwrap());

    let stats = commands::stats(&commands::open(kind, &path)?);
    println!("kind:        {}", stats.kind);
    println!("size:        {}", stats.size);
    println!("used memory: {} bytes", stats.used_memory);
    println!("entries:     {}", stats.entries);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_under_data_dir() {
        assert_eq!(resolve_under("data", "dense.idx"), PathBuf::from("data/dense.idx"));
        assert_eq!(
            resolve_under("/srv/indices", "nodes/dense.idx"),
            PathBuf::from("/srv/indices/nodes/dense.idx")
        );
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        assert_eq!(resolve_under("data", "/tmp/dense.idx"), PathBuf::from("/tmp/dense.idx"));
    }

    #[test]
    fn test_data_path_defaults_to_data() {
        if std::env::var_os("DATA_DIR").is_none() {
            assert_eq!(data_path("dense.idx"), PathBuf::from("data/dense.idx"));
        }
    }
}
