use crate::api::{Counts, Placement, ReadObservation};
use crate::cigar::Cigar;
use crate::types::Strand;
use anyhow::{Context, Result, anyhow};
use noodles::sam;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Read collapsed alignments against precursors from a SAM file.
///
/// Unmapped records are skipped. A `_x<N>` suffix on the read name gives its
/// count, otherwise the count is 1.
pub fn read_sam(path: &Path) -> Result<Vec<ReadObservation>> {
    let file =
        File::open(path).with_context(|| format!("failed to open SAM {}", path.display()))?;
    let mut reader = sam::io::Reader::new(BufReader::new(file));
    let header = reader.read_header()?;

    let mut reads = Vec::new();
    let mut unmapped = 0u64;
    for result in reader.record_bufs(&header) {
        let record = result?;
        if record.flags().is_unmapped() {
            unmapped += 1;
            continue;
        }

        let name = record
            .name()
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_default();
        let precursor = record
            .reference_sequence_id()
            .and_then(|id| header.reference_sequences().get_index(id))
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| anyhow!("mapped read {name} has no reference sequence"))?;
        let start = record
            .alignment_start()
            .map(|pos| pos.get() as i64 - 1)
            .ok_or_else(|| anyhow!("mapped read {name} has no alignment start"))?;
        let cigar = Cigar::from_sam_ops(record.cigar().as_ref())
            .with_context(|| format!("read {name}"))?;
        let sequence = String::from_utf8_lossy(record.sequence().as_ref()).into_owned();
        let strand = if record.flags().is_reverse_complemented() {
            Strand::Reverse
        } else {
            Strand::Forward
        };

        reads.push(
            ReadObservation::new(sequence, precursor)
                .with_counts(Counts::Single(count_from_name(&name)))
                .with_strand(strand)
                .with_placement(Placement::Aligned { start, cigar }),
        );
    }

    tracing::info!(
        mapped = reads.len(),
        unmapped,
        "read alignments from {}",
        path.display()
    );
    Ok(reads)
}

/// Count encoded as a `_x<N>` name suffix by read collapsers.
pub fn count_from_name(name: &str) -> u64 {
    name.rsplit_once("_x")
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(1)
}
