use crate::annotate::{Annotator, Observer};
use crate::annotation::AnnotationRecord;
use crate::api::ReadObservation;
use crate::error::Error;
use anyhow::Result;
use crossfire::mpmc;
use std::collections::BTreeMap;
use std::ops::Range;
use std::thread;

/// Reads handed to a worker at a time.
const CHUNK_READS: usize = 256;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub total_reads: u64,
    pub annotated: u64,
    pub canonical: u64,
    pub skipped: u64,
}

/// Annotate every read, returning records in input order.
///
/// Per-read failures are counted and reported to `observer`; a fatal error
/// aborts the run. The output does not depend on `threads`.
pub fn run(
    reads: &[ReadObservation],
    annotator: &Annotator<'_>,
    observer: &dyn Observer,
    threads: usize,
) -> Result<(Vec<AnnotationRecord>, Stats)> {
    let mut stats = Stats::default();
    let mut records = Vec::with_capacity(reads.len());

    let chunks: Vec<Range<usize>> = (0..reads.len())
        .step_by(CHUNK_READS)
        .map(|start| start..(start + CHUNK_READS).min(reads.len()))
        .collect();

    if threads > 1 && chunks.len() > 1 {
        crossfire::detect_backoff_cfg();
        let worker_count = threads;
        let cap = worker_count.saturating_mul(4).max(8);
        let (tx_work, rx_work) = mpmc::bounded_blocking::<WorkItem>(cap);
        let (tx_res, rx_res) = mpmc::unbounded_blocking::<ResultItem>();

        thread::scope(|scope| -> Result<()> {
            for _ in 0..worker_count {
                let rx_work = rx_work.clone();
                let tx_res = tx_res.clone();
                scope.spawn(move || {
                    while let Ok(item) = rx_work.recv() {
                        let results = annotate_chunk(&reads[item.range], annotator);
                        let _ = tx_res.send(ResultItem {
                            idx: item.idx,
                            results,
                        });
                    }
                });
            }
            drop(tx_res);

            for (idx, range) in chunks.iter().enumerate() {
                tx_work.send(WorkItem {
                    idx,
                    range: range.clone(),
                })?;
            }
            drop(tx_work);

            let mut pending: BTreeMap<usize, Vec<Result<AnnotationRecord, Error>>> =
                BTreeMap::new();
            let mut next_idx = 0usize;

            while next_idx < chunks.len() {
                let res = rx_res
                    .recv()
                    .map_err(|_| anyhow::anyhow!("worker result channel closed"))?;
                pending.insert(res.idx, res.results);
                while let Some(results) = pending.remove(&next_idx) {
                    let chunk = &reads[chunks[next_idx].clone()];
                    collect_chunk(chunk, results, observer, &mut stats, &mut records)?;
                    next_idx += 1;
                }
            }

            Ok(())
        })?;

        return Ok((records, stats));
    }

    for range in chunks {
        let chunk = &reads[range];
        let results = annotate_chunk(chunk, annotator);
        collect_chunk(chunk, results, observer, &mut stats, &mut records)?;
    }

    Ok((records, stats))
}

struct WorkItem {
    idx: usize,
    range: Range<usize>,
}

struct ResultItem {
    idx: usize,
    results: Vec<Result<AnnotationRecord, Error>>,
}

fn annotate_chunk(
    chunk: &[ReadObservation],
    annotator: &Annotator<'_>,
) -> Vec<Result<AnnotationRecord, Error>> {
    chunk.iter().map(|read| annotator.annotate(read)).collect()
}

fn collect_chunk(
    chunk: &[ReadObservation],
    results: Vec<Result<AnnotationRecord, Error>>,
    observer: &dyn Observer,
    stats: &mut Stats,
    records: &mut Vec<AnnotationRecord>,
) -> Result<()> {
    for (read, result) in chunk.iter().zip(results) {
        stats.total_reads += 1;
        match result {
            Ok(record) => {
                stats.annotated += 1;
                if record.feature_type == crate::annotation::FEATURE_REFERENCE {
                    stats.canonical += 1;
                }
                records.push(record);
            }
            Err(e) if e.is_fatal() => {
                return Err(anyhow::Error::new(e)
                    .context(format!("cannot annotate reads of {}", read.precursor)));
            }
            Err(e) => {
                stats.skipped += 1;
                observer.read_skipped(read, &e);
            }
        }
    }
    Ok(())
}
