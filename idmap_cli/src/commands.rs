use anyhow::{Context, Result, bail};
use idmap::{AnyIndex, DenseIndex, IdMap, IndexKind, SparseIndex};
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::input::{LoadStats, Source, load_pairs};

pub type Index = AnyIndex<u64, u32>;

/// Dense builds refuse to allocate more than this when a sparse index fits
/// the input better.
const DENSE_MEMORY_LIMIT: usize = 1 << 30;

/// Reads pairs from `source`, sorts and dumps them to `output`.
///
/// Pairs are staged in a sparse list first so the id range is known before
/// any dense slot is allocated.
pub fn build(kind: IndexKind, source: &Source<'_>, output: &Path) -> Result<LoadStats> {
    let start = Instant::now();
    let mut staged = SparseIndex::<u64, u32>::new();
    let stats = load_pairs(source, &mut staged)?;
    if stats.skipped > 0 {
        warn!(skipped = stats.skipped, "skipped malformed records");
    }
    if let Some(max_id) = stats.max_id {
        let recommended = IndexKind::for_density::<u64, u32>(stats.records, max_id);
        if kind == IndexKind::Dense {
            match dense_bytes(max_id) {
                Some(bytes) if recommended == IndexKind::Dense || bytes <= DENSE_MEMORY_LIMIT => {}
                Some(bytes) => bail!(
                    "dense index up to id {max_id} needs {bytes} bytes for {} records, use --kind sparse",
                    stats.records
                ),
                None => bail!("dense index up to id {max_id} does not fit in memory, use --kind sparse"),
            }
        }
        if recommended != kind {
            warn!(%kind, %recommended, max_id, records = stats.records, "index kind uses more memory than needed");
        }
    }

    let mut index = match kind {
        IndexKind::Sparse => Index::Sparse(staged),
        IndexKind::Dense => {
            let slots = stats.max_id.map_or(0, |max_id| max_id as usize + 1);
            let mut dense = DenseIndex::with_capacity(slots);
            dense.extend(staged.iter().map(|entry| (entry.id, entry.value)));
            Index::Dense(dense)
        }
    };

    index.sort();
    let mut file = File::create(output)
        .with_context(|| format!("Could not create output file {}", output.display()))?;
    index
        .dump(&mut file)
        .with_context(|| format!("Could not write index to {}", output.display()))?;

    info!(
        %kind,
        records = stats.records,
        size = index.size(),
        bytes = index.used_memory(),
        "built index in {:.2?}",
        start.elapsed()
    );
    Ok(stats)
}

/// Bytes a dense `u32` index reaching `max_id` occupies, `None` past `usize`.
fn dense_bytes(max_id: u64) -> Option<usize> {
    let slots = usize::try_from(max_id.checked_add(1)?).ok()?;
    slots.checked_mul(size_of::<u32>())
}

/// Opens a dump and makes it ready for lookups.
pub fn open(kind: IndexKind, path: &Path) -> Result<Index> {
    let mut index = Index::load(kind, path)
        .with_context(|| format!("Could not load {} index from {}", kind, path.display()))?;
    index.sort();
    Ok(index)
}

/// Looks every id up, `None` for ids without a value.
pub fn lookup(index: &Index, ids: &[u64]) -> Vec<(u64, Option<u32>)> {
    ids.iter().map(|&id| (id, index.get_opt(id))).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub kind: IndexKind,
    pub size: usize,
    pub used_memory: usize,
    /// Slots holding a value (dense) or distinct ids (sparse).
    pub entries: usize,
}

pub fn stats(index: &Index) -> IndexStats {
    let entries = match index {
        AnyIndex::Dense(dense) => dense.entries().count(),
        AnyIndex::Sparse(sparse) => {
            let mut distinct = 0;
            let mut previous = None;
            for entry in sparse.iter() {
                if previous != Some(entry.id) {
                    distinct += 1;
                    previous = Some(entry.id);
                }
            }
            distinct
        }
    };
    IndexStats {
        kind: index.kind(),
        size: index.size(),
        used_memory: index.used_memory(),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_input(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("pairs.txt");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_build_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "4 40\n2 20\n7 70\n");

        for kind in [IndexKind::Dense, IndexKind::Sparse] {
            let output = dir.path().join(format!("{kind}.idx"));
            let stats = build(kind, &Source::Text(&input), &output).unwrap();
            assert_eq!(stats.records, 3);

            let index = open(kind, &output).unwrap();
            assert_eq!(
                lookup(&index, &[2, 3, 7, 100]),
                vec![(2, Some(20)), (3, None), (7, Some(70)), (100, None)]
            );
        }
    }

    #[test]
    fn test_dump_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "9 1\n0 2\n");

        let dense = dir.path().join("dense.idx");
        build(IndexKind::Dense, &Source::Text(&input), &dense).unwrap();
        assert_eq!(std::fs::metadata(&dense).unwrap().len(), 10 * 4);

        let sparse = dir.path().join("sparse.idx");
        build(IndexKind::Sparse, &Source::Text(&input), &sparse).unwrap();
        assert_eq!(std::fs::metadata(&sparse).unwrap().len(), 2 * 16);
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "3 1\n3 2\n1 5\n");

        let sparse = dir.path().join("sparse.idx");
        build(IndexKind::Sparse, &Source::Text(&input), &sparse).unwrap();
        let stats = stats(&open(IndexKind::Sparse, &sparse).unwrap());
        assert_eq!(stats.size, 3);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.used_memory, 48);

        let dense = dir.path().join("dense.idx");
        build(IndexKind::Dense, &Source::Text(&input), &dense).unwrap();
        let index = open(IndexKind::Dense, &dense).unwrap();
        assert_eq!(
            super::stats(&index),
            IndexStats {
                kind: IndexKind::Dense,
                size: 4,
                used_memory: 16,
                entries: 2,
            }
        );
        // the later value for id 3 wins in a dense index
        assert_eq!(index.get(3).unwrap(), 2);
    }

    #[test]
    fn test_dense_build_rejects_huge_ids() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "1 1\n4000000000000000 2\n");

        let dense = dir.path().join("dense.idx");
        let err = build(IndexKind::Dense, &Source::Text(&input), &dense).unwrap_err();
        assert!(err.to_string().contains("--kind sparse"));
        assert!(!dense.exists());

        let sparse = dir.path().join("sparse.idx");
        let stats = build(IndexKind::Sparse, &Source::Text(&input), &sparse).unwrap();
        assert_eq!(stats.max_id, Some(4_000_000_000_000_000));
        let index = open(IndexKind::Sparse, &sparse).unwrap();
        assert_eq!(index.get_opt(4_000_000_000_000_000), Some(2));
    }

    #[test]
    fn test_dense_bytes() {
        assert_eq!(dense_bytes(9), Some(40));
        assert_eq!(dense_bytes(u64::MAX), None);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open(IndexKind::Dense, &dir.path().join("missing.idx")).is_err());
    }
}
