//! Precursor hairpins and mature arms.

use crate::error::Error;
use crate::sequence;
use crate::types::{HashMap, HashMapExt, HashSet, HashSetExt};
use crate::variant::{MatureBounds, MatureSequence};
use anyhow::{Context, Result, anyhow};
use needletail::parse_fastx_file;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precursor {
    pub id: String,
    pub species: String,
    pub sequence: String,
}

impl Precursor {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            species: species_of(&id).to_string(),
            id,
            sequence: sequence.into(),
        }
    }
}

/// Species tag of a miRBase id: the prefix before the first `-`.
pub fn species_of(id: &str) -> &str {
    id.split_once('-').map_or(id, |(species, _)| species)
}

/// A mature arm, positioned 0-based with an inclusive end on its precursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mature {
    pub name: String,
    pub precursor: String,
    pub start: usize,
    pub end: usize,
}

impl Mature {
    pub fn bounds(&self) -> MatureBounds {
        MatureBounds {
            start: self.start,
            end: self.end,
        }
    }

    fn overlap(&self, start: usize, end: usize) -> usize {
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        if hi >= lo { hi - lo + 1 } else { 0 }
    }
}

/// Read-only reference tables shared by every read of a run.
#[derive(Debug, Default)]
pub struct ReferenceDb {
    precursors: HashMap<String, Precursor>,
    matures: HashMap<String, Vec<Mature>>,
}

impl ReferenceDb {
    /// Build the tables, rejecting matures that do not fit their precursor.
    pub fn new(precursors: Vec<Precursor>, matures: Vec<Mature>) -> Result<Self, Error> {
        let mut by_id: HashMap<String, Precursor> = HashMap::with_capacity(precursors.len());
        for precursor in precursors {
            by_id.insert(precursor.id.clone(), precursor);
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut arms: HashMap<String, Vec<Mature>> = HashMap::new();
        for mature in matures {
            let precursor = by_id
                .get(&mature.precursor)
                .ok_or_else(|| Error::MissingReference(mature.precursor.clone()))?;
            if mature.start > mature.end || mature.end >= precursor.sequence.len() {
                return Err(Error::MalformedReference(format!(
                    "{} at {}..={} does not fit {} (length {})",
                    mature.name,
                    mature.start,
                    mature.end,
                    precursor.id,
                    precursor.sequence.len()
                )));
            }
            if !seen.insert((mature.precursor.clone(), mature.name.clone())) {
                return Err(Error::MalformedReference(format!(
                    "{} listed twice for {}",
                    mature.name, mature.precursor
                )));
            }
            arms.entry(mature.precursor.clone()).or_default().push(mature);
        }
        for list in arms.values_mut() {
            list.sort_by_key(|m| (m.start, m.end));
        }

        Ok(Self {
            precursors: by_id,
            matures: arms,
        })
    }

    /// Load hairpins and mature arms, keeping the arms of loaded hairpins only.
    pub fn from_files(hairpin: &Path, gff: &Path, species: Option<&str>) -> Result<Self> {
        let precursors = load_precursors(hairpin, species)?;
        let ids: HashSet<&str> = precursors.iter().map(|p| p.id.as_str()).collect();
        let matures: Vec<Mature> = load_matures(gff)?
            .into_iter()
            .filter(|m| ids.contains(m.precursor.as_str()))
            .collect();
        tracing::info!(
            precursors = precursors.len(),
            matures = matures.len(),
            "loaded reference"
        );
        Ok(Self::new(precursors, matures)?)
    }

    pub fn precursor(&self, id: &str) -> Result<&Precursor, Error> {
        self.precursors
            .get(id)
            .ok_or_else(|| Error::MissingReference(id.to_string()))
    }

    pub fn matures(&self, precursor: &str) -> &[Mature] {
        self.matures.get(precursor).map_or(&[], Vec::as_slice)
    }

    /// The mature overlapping `start..=end` the most; ties go to the earliest arm.
    pub fn assign_mature(&self, precursor: &str, start: usize, end: usize) -> Option<&Mature> {
        let mut best: Option<(&Mature, usize)> = None;
        for mature in self.matures(precursor) {
            let overlap = mature.overlap(start, end);
            if overlap > 0 && best.is_none_or(|(_, b)| overlap > b) {
                best = Some((mature, overlap));
            }
        }
        best.map(|(m, _)| m)
    }

    pub fn mature_sequence<'a>(&'a self, mature: &Mature) -> Result<MatureSequence<'a>, Error> {
        let precursor = self.precursor(&mature.precursor)?;
        Ok(MatureSequence {
            precursor: &precursor.sequence,
            bounds: mature.bounds(),
        })
    }

    pub fn precursor_count(&self) -> usize {
        self.precursors.len()
    }

    pub fn mature_count(&self) -> usize {
        self.matures.values().map(Vec::len).sum()
    }
}

/// Database label of a miRBase GFF3 file, e.g. `miRBasev21`.
///
/// Taken from the first header comment naming a release, such as
/// `# microRNAs:               miRBase v21`.
pub fn guess_database(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("failed to open GFF3 {}", path.display()))?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.starts_with('#') {
            break;
        }
        if let Some((_, rest)) = line.split_once("miRBase")
            && let Some(version) = rest.split_whitespace().next()
            && let Some(number) = version.strip_prefix('v')
            && number.starts_with(|c: char| c.is_ascii_digit())
        {
            return Ok(format!("miRBase{version}"));
        }
    }
    Err(anyhow!(
        "no miRBase release in the header of {}",
        path.display()
    ))
}

/// Load hairpin sequences, keeping ids that start with `species` when given.
///
/// Only the first word of each header is used as the id. Sequences are
/// uppercased and `U` becomes `T`.
pub fn load_precursors(path: &Path, species: Option<&str>) -> Result<Vec<Precursor>> {
    let mut reader = parse_fastx_file(path)
        .map_err(|e| anyhow!("failed to open FASTA {}: {}", path.display(), e))?;
    let mut precursors = Vec::new();

    while let Some(result) = reader.next() {
        let record = result.map_err(|e| anyhow!("failed to parse FASTA record: {}", e))?;
        let header = String::from_utf8_lossy(record.id());
        let id = header.split_whitespace().next().unwrap_or("").to_string();
        if id.is_empty() {
            return Err(anyhow!("FASTA record without an id in {}", path.display()));
        }
        if let Some(sps) = species
            && species_of(&id) != sps
        {
            continue;
        }
        let raw = String::from_utf8_lossy(&record.seq()).into_owned();
        let seq = sequence::normalize(&raw).map_err(|e| anyhow!("{id}: {e}"))?;
        precursors.push(Precursor::new(id, seq));
    }

    Ok(precursors)
}

#[derive(Debug)]
struct GffFeature {
    id: String,
    name: String,
    start: usize,
    end: usize,
    reverse: bool,
    derives_from: Option<String>,
}

/// Load mature arms from a miRBase GFF3 file.
///
/// `miRNA_primary_transcript` features define precursors; `miRNA` features
/// point at them through `Derives_from`. Offsets are relative to the
/// precursor in its own orientation.
pub fn load_matures(path: &Path) -> Result<Vec<Mature>> {
    let reader = File::open(path)?;
    let mut reader = noodles::gff::io::Reader::new(BufReader::new(reader));

    let mut primaries: HashMap<String, GffFeature> = HashMap::new();
    let mut arms: Vec<GffFeature> = Vec::new();

    for result in reader.record_bufs() {
        let record = result?;

        let feature_type: &[u8] = record.ty().as_ref();
        let is_primary = feature_type == b"miRNA_primary_transcript";
        if !is_primary && feature_type != b"miRNA" {
            continue;
        }

        let attrs = record.attributes();
        let id = get_record_buf_attribute(attrs, b"ID")
            .ok_or_else(|| anyhow!("missing ID in GFF3 attributes"))?;
        let name = get_record_buf_attribute(attrs, b"Name").unwrap_or_else(|| id.clone());
        let feature = GffFeature {
            id,
            name,
            start: record.start().get(),
            end: record.end().get(),
            reverse: matches!(
                record.strand(),
                noodles::gff::feature::record::Strand::Reverse
            ),
            derives_from: get_record_buf_attribute(attrs, b"Derives_from"),
        };

        if is_primary {
            primaries.insert(feature.id.clone(), feature);
        } else {
            arms.push(feature);
        }
    }

    let mut matures = Vec::with_capacity(arms.len());
    for arm in arms {
        let parent_id = arm
            .derives_from
            .as_deref()
            .ok_or_else(|| anyhow!("miRNA {} has no Derives_from", arm.name))?;
        let parent = primaries
            .get(parent_id)
            .ok_or_else(|| anyhow!("miRNA {} derives from unknown {}", arm.name, parent_id))?;
        if arm.start < parent.start || arm.end > parent.end {
            return Err(anyhow!(
                "miRNA {} lies outside its precursor {}",
                arm.name,
                parent.name
            ));
        }

        let (start, end) = if parent.reverse {
            (parent.end - arm.end, parent.end - arm.start)
        } else {
            (arm.start - parent.start, arm.end - parent.start)
        };
        matures.push(Mature {
            name: arm.name,
            precursor: parent.name.clone(),
            start,
            end,
        });
    }

    Ok(matures)
}

fn get_record_buf_attribute(
    attrs: &noodles::gff::feature::record_buf::Attributes,
    key: &[u8],
) -> Option<String> {
    let value = attrs.get(key)?;
    value.iter().next().map(|v| v.to_string())
}
