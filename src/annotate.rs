//! Per-read annotation: place the read on its precursor, assign a mature arm,
//! classify the variant and render the annotation record.

use crate::annotation::{self, AnnotationRecord, Attributes};
use crate::api::{Placement, ReadObservation};
use crate::cigar::{self, Cigar, CigarOp};
use crate::codec;
use crate::error::{Error, Result};
use crate::reference::{Precursor, ReferenceDb};
use crate::sequence;
use crate::sw::{self, Scoring};
use crate::types::Strand;
use crate::variant::{self, ClassifierConfig, MatureSequence, ReadAlignment};

/// Receives the non-fatal events of a run.
///
/// Implementations must be shareable across worker threads.
pub trait Observer: Sync {
    fn read_skipped(&self, read: &ReadObservation, error: &Error) {
        let _ = (read, error);
    }

    fn record_excluded(&self, sample: &str, record: &AnnotationRecord, error: &Error) {
        let _ = (sample, record, error);
    }

    fn conflict(&self, error: &Error) {
        let _ = error;
    }
}

/// Reports every event as a `tracing` warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn read_skipped(&self, read: &ReadObservation, error: &Error) {
        tracing::warn!(
            precursor = %read.precursor,
            sequence = %read.sequence,
            count = read.counts.total(),
            "skipping read: {error}"
        );
    }

    fn record_excluded(&self, sample: &str, record: &AnnotationRecord, error: &Error) {
        tracing::warn!(
            sample,
            chrom = %record.chrom,
            start = record.start,
            "excluding record from merge: {error}"
        );
    }

    fn conflict(&self, error: &Error) {
        tracing::warn!("{error}");
    }
}

#[derive(Debug, Clone)]
pub struct AnnotateConfig {
    /// Value of the source column.
    pub source: String,
    /// Sample columns of the Expression attribute.
    pub samples: Vec<String>,
    pub scoring: Scoring,
    pub classifier: ClassifierConfig,
    /// Rebuild every read from its signature and reject mismatches.
    pub verify: bool,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            source: "miRBase".to_string(),
            samples: Vec::new(),
            scoring: Scoring::default(),
            classifier: ClassifierConfig::default(),
            verify: true,
        }
    }
}

#[derive(Debug)]
pub struct Annotator<'r> {
    reference: &'r ReferenceDb,
    config: AnnotateConfig,
}

impl<'r> Annotator<'r> {
    pub fn new(reference: &'r ReferenceDb, config: AnnotateConfig) -> Self {
        Self { reference, config }
    }

    pub fn config(&self) -> &AnnotateConfig {
        &self.config
    }

    /// Annotate one read. Only [`Error::is_fatal`] errors concern the whole run.
    pub fn annotate(&self, read: &ReadObservation) -> Result<AnnotationRecord> {
        let precursor = self.reference.precursor(&read.precursor)?;
        if read.strand == Strand::Reverse {
            return Err(Error::UnsupportedStrand(read.strand.as_char()));
        }
        let seq = sequence::normalize(&read.sequence)?;

        let (start, cigar) = self.place(&seq, precursor, &read.placement)?;
        let span = cigar.reference_len();
        let window = &precursor.sequence[start..start + span];

        let mature = self
            .reference
            .assign_mature(&precursor.id, start, start + span.saturating_sub(1))
            .ok_or_else(|| {
                Error::OutOfBoundsVariant(format!(
                    "read at {start} does not overlap a mature arm of {}",
                    precursor.id
                ))
            })?;

        let alignment = ReadAlignment {
            read: &seq,
            precursor: &precursor.sequence,
            start: start as i64,
            cigar: &cigar,
        };
        let signature = variant::classify(&alignment, mature.bounds(), &self.config.classifier)?;

        if self.config.verify {
            let mature_seq = MatureSequence {
                precursor: &precursor.sequence,
                bounds: mature.bounds(),
            };
            let expected = variant::reconstruct(&mature_seq, &signature)?;
            if expected != seq {
                return Err(Error::ReconstructionMismatch {
                    expected,
                    observed: seq,
                });
            }
        }

        let record_start = mature.start as i64 + i64::from(signature.five_prime_offset) + 1;
        let record_start = record_start as u64;
        let feature_type = if signature.is_reference() {
            annotation::FEATURE_REFERENCE
        } else {
            annotation::FEATURE_ISOMIR
        };
        let expression: Vec<String> = read
            .counts
            .values_for(&self.config.samples)
            .iter()
            .map(u64::to_string)
            .collect();

        let mut attributes = Attributes::new();
        attributes.insert(annotation::READ, seq.clone());
        attributes.insert(annotation::UID, codec::uid(&seq)?);
        attributes.insert(annotation::NAME, mature.name.clone());
        attributes.insert(annotation::PARENT, precursor.id.clone());
        attributes.insert(annotation::VARIANT, signature.to_string());
        attributes.insert(
            annotation::CIGAR,
            cigar::mismatch_cigar(&cigar, &seq, window)?,
        );
        attributes.insert(annotation::EXPRESSION, expression.join(","));
        attributes.insert(annotation::FILTER, "Pass");
        attributes.insert(annotation::HITS, "1");

        tracing::trace!(uid = attributes.uid(), variant = %signature, "annotated read");

        Ok(AnnotationRecord {
            chrom: precursor.id.clone(),
            source: self.config.source.clone(),
            feature_type: feature_type.to_string(),
            start: record_start,
            end: record_start + seq.len() as u64 - 1,
            score: ".".to_string(),
            strand: Strand::Forward,
            phase: ".".to_string(),
            attributes,
        })
    }

    /// Start on the precursor and canonical CIGAR of a read.
    fn place(
        &self,
        seq: &str,
        precursor: &Precursor,
        placement: &Placement,
    ) -> Result<(usize, Cigar)> {
        match placement {
            Placement::Aligned { start, cigar } => {
                let span = cigar.reference_len();
                if *start < 0 || *start as usize + span > precursor.sequence.len() {
                    return Err(Error::OutOfBoundsVariant(format!(
                        "alignment {start}+{span} outside {} (length {})",
                        precursor.id,
                        precursor.sequence.len()
                    )));
                }
                if cigar.query_len() != seq.len() {
                    return Err(Error::CigarLengthMismatch {
                        side: "query",
                        cigar: cigar.query_len(),
                        sequence: seq.len(),
                    });
                }
                let start = *start as usize;
                let window = &precursor.sequence[start..start + span];

                // Clipped ends stay where they are; only the aligned core is normalized.
                let (lead, core, trail) = cigar.split_terminal_insertions();
                let core_read = &seq[lead as usize..seq.len() - trail as usize];
                let mut corrected = cigar::correct_cigar(&core, core_read, window)?;
                corrected.prepend_operation(lead, CigarOp::Ins);
                corrected.add_operation(trail, CigarOp::Ins);
                Ok(self.settle_ends(start, &corrected, precursor.sequence.len()))
            }
            Placement::Unaligned => {
                let aln = sw::align_with(&precursor.sequence, seq, &self.config.scoring);
                if aln.is_empty() {
                    return Err(Error::OutOfBoundsVariant(format!(
                        "read does not align to {}",
                        precursor.id
                    )));
                }
                // Read ends left out of the local alignment become insertions.
                let mut cigar = aln.cigar();
                cigar.prepend_operation(aln.query_start as u32, CigarOp::Ins);
                cigar.add_operation((seq.len() - aln.query_end) as u32, CigarOp::Ins);
                Ok(self.settle_ends(aln.reference_start, &cigar, precursor.sequence.len()))
            }
        }
    }

    /// Pair read bases near the 5' and 3' ends with the precursor without gaps.
    ///
    /// Untemplated 5' bases are laid on the flanking precursor bases when there
    /// is room. A gap with fewer than `terminal_window` templated columns
    /// beyond it is replaced by ungapped columns, so the bases show up as
    /// substitutions or additions rather than an indel. Trailing insertions
    /// are left as additions.
    fn settle_ends(&self, start: usize, cigar: &Cigar, precursor_len: usize) -> (usize, Cigar) {
        let window = self.config.classifier.terminal_window;
        let (lead, core, trail) = cigar.split_terminal_insertions();
        let mut start = start;

        let mut ops = Vec::with_capacity(core.ops.len() + 1);
        if lead as usize <= start {
            start -= lead as usize;
            ops.push((lead, CigarOp::Match));
        } else {
            ops.push((lead, CigarOp::Ins));
        }
        ops.extend(core.ops);
        let mut ops = rebuild(ops).ops;

        if let Some(block) = gapped_flank(&ops, window) {
            let (ref_used, query_used) = consumed(&ops[..block]);
            let anchor = start + ref_used;
            if anchor >= query_used {
                start = anchor - query_used;
                ops.splice(..block, [(query_used as u32, CigarOp::Match)]);
            }
        }

        let mut reversed: Vec<(u32, CigarOp)> = ops.iter().rev().copied().collect();
        if let Some(block) = gapped_flank(&reversed, window) {
            let (_, query_used) = consumed(&reversed[..block]);
            let (rest_ref, _) = consumed(&reversed[block..]);
            let op = if start + rest_ref + query_used <= precursor_len {
                CigarOp::Match
            } else {
                CigarOp::Ins
            };
            reversed.splice(..block, [(query_used as u32, op)]);
            ops = reversed.into_iter().rev().collect();
        }

        ops.push((trail, CigarOp::Ins));
        (start, rebuild(ops))
    }
}

fn rebuild(ops: Vec<(u32, CigarOp)>) -> Cigar {
    let mut cigar = Cigar::default();
    for (len, op) in ops {
        cigar.add_operation(len, op);
    }
    cigar
}

/// Reference and query bases consumed by `ops`.
fn consumed(ops: &[(u32, CigarOp)]) -> (usize, usize) {
    ops.iter().fold((0, 0), |(r, q), &(len, op)| {
        let len = len as usize;
        (
            r + if op.consumes_reference() { len } else { 0 },
            q + if op.consumes_query() { len } else { 0 },
        )
    })
}

/// Index of the match run that follows a gap after a short leading match run.
fn gapped_flank(ops: &[(u32, CigarOp)], window: usize) -> Option<usize> {
    let &(len, op) = ops.first()?;
    if op != CigarOp::Match || len as usize >= window {
        return None;
    }
    let block = ops
        .iter()
        .skip(1)
        .position(|&(_, op)| op == CigarOp::Match)?
        + 1;
    (block > 1).then_some(block)
}
