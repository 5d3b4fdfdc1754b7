use anyhow::{Context, Result};
use idmap::IdMap;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Where `(id, value)` pairs come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source<'a> {
    Stdin,
    Text(&'a Path),
    Parquet {
        path: &'a Path,
        id_column: &'a str,
        value_column: &'a str,
    },
}

impl<'a> Source<'a> {
    /// Picks the reader from the file extension; `-` is stdin.
    pub fn detect(input: &'a str, id_column: &'a str, value_column: &'a str) -> Self {
        if input == "-" {
            return Source::Stdin;
        }
        let path = Path::new(input);
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("parquet") => Source::Parquet {
                path,
                id_column,
                value_column,
            },
            _ => Source::Text(path),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub records: usize,
    pub skipped: usize,
    pub max_id: Option<u64>,
}

impl LoadStats {
    fn record(&mut self, id: u64) {
        self.records += 1;
        self.max_id = Some(self.max_id.map_or(id, |max| max.max(id)));
    }
}

/// Feeds every pair of `source` into `index`.
pub fn load_pairs(source: &Source<'_>, index: &mut dyn IdMap<u64, u32>) -> Result<LoadStats> {
    match source {
        Source::Stdin => read_text_pairs(std::io::stdin().lock(), index),
        Source::Text(path) => {
            let file = File::open(path)
                .with_context(|| format!("Could not open input {}", path.display()))?;
            read_text_pairs(BufReader::new(file), index)
        }
        Source::Parquet {
            path,
            id_column,
            value_column,
        } => read_parquet_pairs(path, id_column, value_column, index),
    }
}

/// Parses an `id value` line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<(u64, u32)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let (Some(id), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        anyhow::bail!("Invalid line format: {line}");
    };
    Ok(Some((id.parse()?, value.parse()?)))
}

pub fn read_text_pairs<R: BufRead>(reader: R, index: &mut dyn IdMap<u64, u32>) -> Result<LoadStats> {
    let mut stats = LoadStats::default();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line) {
            Ok(Some((id, value))) => {
                index.set(id, value);
                stats.record(id);
            }
            Ok(None) => continue,
            Err(err) => {
                tracing::debug!(line = line_number + 1, %err, "skipping malformed line");
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

pub fn read_parquet_pairs(
    path: &Path,
    id_column: &str,
    value_column: &str,
    index: &mut dyn IdMap<u64, u32>,
) -> Result<LoadStats> {
    let pl_path: PlPath = PlPath::Local(Arc::from(path));
    let df: DataFrame = LazyFrame::scan_parquet(pl_path, Default::default())?
        .select([
            col(id_column).cast(DataType::UInt64),
            col(value_column).cast(DataType::UInt32),
        ])
        .collect()
        .with_context(|| format!("Could not read {}", path.display()))?;

    let ids = df.column(id_column)?.u64()?;
    let values = df.column(value_column)?.u32()?;
    index.reserve(ids.len());

    let mut stats = LoadStats::default();
    for (opt_id, opt_value) in ids.into_iter().zip(values.into_iter()) {
        if let (Some(id), Some(value)) = (opt_id, opt_value) {
            index.set(id, value);
            stats.record(id);
        } else {
            stats.skipped += 1;
        }
    }
    Ok(stats)
}
