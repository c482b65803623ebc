//! mirGFF3 annotation records.
//!
//! One record per line, nine tab-separated columns:
//! `chrom source type start end score strand phase attributes`, where the
//! attribute block is a sequence of `Key value;` pairs.

use crate::codec;
use crate::error::{Error, Result};
use crate::types::Strand;
use crate::variant::{self, VariantSignature};
use indexmap::IndexMap;
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

pub const READ: &str = "Read";
pub const UID: &str = "UID";
pub const NAME: &str = "Name";
pub const PARENT: &str = "Parent";
pub const VARIANT: &str = "Variant";
pub const CIGAR: &str = "Cigar";
pub const EXPRESSION: &str = "Expression";
pub const FILTER: &str = "Filter";
pub const HITS: &str = "Hits";

pub const FEATURE_REFERENCE: &str = "ref_miRNA";
pub const FEATURE_ISOMIR: &str = "isomiR";

/// Attributes every annotation record must carry.
pub const REQUIRED_ATTRIBUTES: [&str; 4] = [UID, VARIANT, CIGAR, EXPRESSION];

const VERSION_HEADER: &str = "## mirGFF3. VERSION 1.0";
const COLDATA_PREFIX: &str = "## COLDATA:";
const ONTOLOGY_PREFIX: &str = "## source-ontology:";

/// Ordered attribute block. Unknown keys are kept in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(IndexMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or replace a value; a replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn uid(&self) -> Option<&str> {
        self.get(UID)
    }

    pub fn variant(&self) -> Result<VariantSignature> {
        variant::parse_variant_string(self.get(VARIANT).unwrap_or(variant::CANONICAL))
    }

    /// Expression values, one per sample column.
    pub fn expression(&self) -> Result<Vec<u64>> {
        let raw = self
            .get(EXPRESSION)
            .ok_or_else(|| Error::MalformedRecord("missing Expression attribute".to_string()))?;
        raw.split(',')
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| {
                    Error::MalformedRecord(format!("invalid Expression value {raw:?}"))
                })
            })
            .collect()
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Render attributes as `Key value;` pairs separated by a space.
pub fn encode_attributes(attributes: &Attributes) -> String {
    attributes
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                format!("{k};")
            } else {
                format!("{k} {v};")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse an attribute block.
///
/// Accepts `Key value` and `Key=value` pairs, bare keys, and a missing final
/// `;`. Keys keep their order of appearance.
pub fn decode_attributes(s: &str) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for field in s.split(';').map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = match field.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim()),
            None => field.split_once('=').unwrap_or((field, "")),
        };
        if key.is_empty() {
            return Err(Error::MalformedRecord(format!(
                "attribute without a key in {s:?}"
            )));
        }
        attributes.insert(key, value);
    }
    Ok(attributes)
}

/// One annotated read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub chrom: String,
    pub source: String,
    pub feature_type: String,
    /// 1-based, inclusive.
    pub start: u64,
    pub end: u64,
    pub score: String,
    pub strand: Strand,
    pub phase: String,
    pub attributes: Attributes,
}

impl AnnotationRecord {
    pub fn uid(&self) -> Option<&str> {
        self.attributes.uid()
    }
}

impl fmt::Display for AnnotationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.source,
            self.feature_type,
            self.start,
            self.end,
            self.score,
            self.strand,
            self.phase,
            encode_attributes(&self.attributes)
        )
    }
}

impl FromStr for AnnotationRecord {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let columns: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if columns.len() != 9 {
            return Err(Error::MalformedRecord(format!(
                "expected 9 columns, got {}",
                columns.len()
            )));
        }
        let coordinate = |idx: usize, name: &str| -> Result<u64> {
            columns[idx].parse().map_err(|_| {
                Error::MalformedRecord(format!("invalid {name} position {:?}", columns[idx]))
            })
        };

        Ok(Self {
            chrom: columns[0].to_string(),
            source: columns[1].to_string(),
            feature_type: columns[2].to_string(),
            start: coordinate(3, "start")?,
            end: coordinate(4, "end")?,
            score: columns[5].to_string(),
            strand: Strand::from_column(columns[6]),
            phase: columns[7].to_string(),
            attributes: decode_attributes(columns[8])?,
        })
    }
}

/// Parsed annotation file: sample columns from `## COLDATA` plus records.
#[derive(Debug, Clone, Default)]
pub struct AnnotationFile {
    pub samples: Vec<String>,
    pub records: Vec<AnnotationRecord>,
    /// Lines that could not be parsed, with their 1-based line numbers.
    pub rejected: Vec<(usize, Error)>,
}

/// Read an annotation file. Malformed lines are collected, not fatal.
pub fn read_annotations<R: BufRead>(reader: R) -> std::io::Result<AnnotationFile> {
    let mut file = AnnotationFile::default();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(coldata) = line.strip_prefix(COLDATA_PREFIX) {
            file.samples = coldata
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            continue;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        match line.parse::<AnnotationRecord>() {
            Ok(record) => file.records.push(record),
            Err(e) => file.rejected.push((line_num + 1, e)),
        }
    }
    Ok(file)
}

pub fn write_header<W: Write>(writer: &mut W, source: &str, samples: &[String]) -> std::io::Result<()> {
    writeln!(writer, "{VERSION_HEADER}")?;
    writeln!(writer, "{ONTOLOGY_PREFIX} {source}")?;
    writeln!(writer, "{COLDATA_PREFIX} {}", samples.join(","))
}

pub fn write_annotations<W: Write>(
    writer: &mut W,
    source: &str,
    samples: &[String],
    records: &[AnnotationRecord],
) -> std::io::Result<()> {
    write_header(writer, source, samples)?;
    for record in records {
        writeln!(writer, "{record}")?;
    }
    Ok(())
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub samples: Vec<String>,
    pub records: usize,
    /// Problems with their 1-based line numbers; 0 for the file as a whole.
    pub problems: Vec<(usize, Error)>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check an annotation file: version and COLDATA headers, parsable lines,
/// known feature types, required attributes, one Expression value per sample
/// and UIDs that encode their Read.
pub fn validate<R: BufRead>(reader: R) -> std::io::Result<Validation> {
    let mut report = Validation::default();
    let mut has_coldata = false;
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let line_num = line_num + 1;
        if line_num == 1 && line.trim_end() != VERSION_HEADER {
            report.problems.push((
                line_num,
                Error::MalformedRecord(format!("expected {VERSION_HEADER:?} first")),
            ));
        }
        if let Some(coldata) = line.strip_prefix(COLDATA_PREFIX) {
            has_coldata = true;
            report.samples = coldata
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            continue;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        report.records += 1;
        let record = match line.parse::<AnnotationRecord>() {
            Ok(record) => record,
            Err(e) => {
                report.problems.push((line_num, e));
                continue;
            }
        };
        for problem in check_record(&record, &report.samples) {
            report.problems.push((line_num, problem));
        }
    }
    if !has_coldata {
        report.problems.push((
            0,
            Error::MalformedRecord(format!("missing {COLDATA_PREFIX} header")),
        ));
    }
    Ok(report)
}

fn check_record(record: &AnnotationRecord, samples: &[String]) -> Vec<Error> {
    let mut problems = Vec::new();
    if record.feature_type != FEATURE_REFERENCE && record.feature_type != FEATURE_ISOMIR {
        problems.push(Error::MalformedRecord(format!(
            "unknown feature type {:?}",
            record.feature_type
        )));
    }
    for key in REQUIRED_ATTRIBUTES {
        if record.attributes.get(key).is_none_or(str::is_empty) {
            problems.push(Error::MalformedRecord(format!("missing {key} attribute")));
        }
    }
    if record.attributes.get(VARIANT).is_some()
        && let Err(e) = record.attributes.variant()
    {
        problems.push(e);
    }
    if record.attributes.get(EXPRESSION).is_some() {
        match record.attributes.expression() {
            Ok(values) if !samples.is_empty() && values.len() != samples.len() => {
                problems.push(Error::MalformedRecord(format!(
                    "{} Expression values for {} samples",
                    values.len(),
                    samples.len()
                )));
            }
            Ok(_) => {}
            Err(e) => problems.push(e),
        }
    }
    if let (Some(uid), Some(read)) = (record.uid(), record.attributes.get(READ))
        && codec::decode_uid(uid).ok().as_deref() != Some(read)
    {
        problems.push(Error::MalformedRecord(format!(
            "UID {uid} does not encode {read}"
        )));
    }
    problems
}
