//! Cross-sample merge of annotation records into an expression table.

use crate::annotate::Observer;
use crate::annotation::{self, AnnotationRecord};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::io::Write;

/// Row identity: precursor, 1-based start and UID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey {
    pub chrom: String,
    pub start: u64,
    pub uid: String,
}

impl IdentityKey {
    pub fn new(chrom: impl Into<String>, start: u64, uid: impl Into<String>) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            uid: uid.into(),
        }
    }

    pub fn of(record: &AnnotationRecord) -> Result<Self> {
        let uid = record.uid().filter(|u| !u.is_empty()).ok_or_else(|| {
            Error::MalformedRecord(format!(
                "record at {}:{} has no UID",
                record.chrom, record.start
            ))
        })?;
        Ok(Self::new(record.chrom.clone(), record.start, uid))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chrom, self.start, self.uid)
    }
}

/// First-seen record of a key and its per-sample counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRow {
    pub record: AnnotationRecord,
    pub counts: IndexMap<String, u64>,
}

impl MergeRow {
    pub fn variant(&self) -> &str {
        self.record.attributes.get(annotation::VARIANT).unwrap_or("")
    }

    pub fn cigar(&self) -> &str {
        self.record.attributes.get(annotation::CIGAR).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeTable {
    samples: Vec<String>,
    rows: BTreeMap<IdentityKey, MergeRow>,
    conflicts: Vec<Error>,
    excluded: usize,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sample column. Columns keep their order of registration.
    pub fn add_sample(&mut self, sample: &str) {
        if !self.samples.iter().any(|s| s == sample) {
            self.samples.push(sample.to_string());
        }
    }

    /// Accumulate one record of `sample`.
    ///
    /// Records without a UID or with an unreadable Expression are excluded
    /// and reported.
    pub fn add(&mut self, sample: &str, record: AnnotationRecord, observer: &dyn Observer) {
        self.add_sample(sample);
        let placed = IdentityKey::of(&record).and_then(|key| {
            let expression = record.attributes.expression()?;
            Ok((key, expression.iter().sum::<u64>()))
        });
        let (key, count) = match placed {
            Ok(placed) => placed,
            Err(e) => {
                self.excluded += 1;
                observer.record_excluded(sample, &record, &e);
                return;
            }
        };
        let mut counts = IndexMap::new();
        counts.insert(sample.to_string(), count);
        self.accumulate(key, MergeRow { record, counts }, observer);
    }

    /// Accumulate one record of a file with several sample columns: the i-th
    /// Expression value is the count of the i-th sample.
    ///
    /// With a single column this is [`MergeTable::add`].
    pub fn add_columns(
        &mut self,
        samples: &[String],
        record: AnnotationRecord,
        observer: &dyn Observer,
    ) {
        if let [sample] = samples {
            self.add(sample, record, observer);
            return;
        }
        for sample in samples {
            self.add_sample(sample);
        }
        let placed = IdentityKey::of(&record).and_then(|key| {
            let expression = record.attributes.expression()?;
            if expression.len() != samples.len() {
                return Err(Error::MalformedRecord(format!(
                    "{} Expression values for {} samples",
                    expression.len(),
                    samples.len()
                )));
            }
            Ok((key, expression))
        });
        let (key, expression) = match placed {
            Ok(placed) => placed,
            Err(e) => {
                self.excluded += 1;
                observer.record_excluded(&samples.join(","), &record, &e);
                return;
            }
        };
        let counts = samples.iter().cloned().zip(expression).collect();
        self.accumulate(key, MergeRow { record, counts }, observer);
    }

    /// Fold a partial table into this one, as if its samples had been added
    /// after the ones already present.
    pub fn absorb(&mut self, other: MergeTable, observer: &dyn Observer) {
        for sample in &other.samples {
            self.add_sample(sample);
        }
        self.conflicts.extend(other.conflicts);
        self.excluded += other.excluded;
        for (key, row) in other.rows {
            self.accumulate(key, row, observer);
        }
    }

    fn accumulate(&mut self, key: IdentityKey, row: MergeRow, observer: &dyn Observer) {
        match self.rows.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                let (key, existing) = (slot.key().to_string(), slot.get_mut());
                for (field, first, second) in [
                    (annotation::VARIANT, existing.variant(), row.variant()),
                    (annotation::CIGAR, existing.cigar(), row.cigar()),
                ] {
                    if first != second {
                        let conflict = Error::ConflictingAnnotation {
                            key: key.clone(),
                            field,
                            first: first.to_string(),
                            second: second.to_string(),
                        };
                        observer.conflict(&conflict);
                        self.conflicts.push(conflict);
                    }
                }
                for (sample, count) in row.counts {
                    *existing.counts.entry(sample).or_insert(0) += count;
                }
            }
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Rows ordered by chrom, start, then UID.
    pub fn rows(&self) -> impl Iterator<Item = (&IdentityKey, &MergeRow)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&MergeRow> {
        self.rows.get(key)
    }

    /// Count of `key` in `sample`; zero when the sample never saw it.
    pub fn count(&self, key: &IdentityKey, sample: &str) -> u64 {
        self.rows
            .get(key)
            .and_then(|row| row.counts.get(sample))
            .copied()
            .unwrap_or(0)
    }

    /// Counts of a row in sample column order.
    pub fn row_counts(&self, row: &MergeRow) -> Vec<u64> {
        self.samples
            .iter()
            .map(|s| row.counts.get(s).copied().unwrap_or(0))
            .collect()
    }

    pub fn conflicts(&self) -> &[Error] {
        &self.conflicts
    }

    pub fn excluded(&self) -> usize {
        self.excluded
    }

    /// Fail with the first recorded conflict, if any.
    pub fn ensure_consistent(&self) -> Result<()> {
        match self.conflicts.first() {
            Some(conflict) => Err(conflict.clone()),
            None => Ok(()),
        }
    }

    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write!(writer, "chrom\tstart\tUID\tVariant\tCigar")?;
        for sample in &self.samples {
            write!(writer, "\t{sample}")?;
        }
        writeln!(writer)?;

        for (key, row) in &self.rows {
            write!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                key.chrom,
                key.start,
                key.uid,
                row.variant(),
                row.cigar()
            )?;
            for count in self.row_counts(row) {
                write!(writer, "\t{count}")?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Merged records whose Expression lists one count per sample column.
    pub fn to_records(&self) -> Vec<AnnotationRecord> {
        self.rows
            .values()
            .map(|row| {
                let mut record = row.record.clone();
                let expression: Vec<String> = self
                    .row_counts(row)
                    .iter()
                    .map(u64::to_string)
                    .collect();
                record
                    .attributes
                    .insert(annotation::EXPRESSION, expression.join(","));
                record
            })
            .collect()
    }
}

/// Merge the records of several samples into one table.
pub fn merge<I>(records_by_sample: I, observer: &dyn Observer) -> MergeTable
where
    I: IntoIterator<Item = (String, Vec<AnnotationRecord>)>,
{
    let mut table = MergeTable::new();
    for (sample, records) in records_by_sample {
        table.add_sample(&sample);
        for record in records {
            table.add(&sample, record, observer);
        }
    }
    tracing::debug!(
        samples = table.samples.len(),
        rows = table.rows.len(),
        conflicts = table.conflicts.len(),
        excluded = table.excluded,
        "merged annotation records"
    );
    table
}

/// Merge the records of one multi-sample file, `samples` being its columns.
pub fn merge_columns(
    samples: &[String],
    records: Vec<AnnotationRecord>,
    observer: &dyn Observer,
) -> MergeTable {
    let mut table = MergeTable::new();
    for sample in samples {
        table.add_sample(sample);
    }
    for record in records {
        table.add_columns(samples, record, observer);
    }
    table
}
