//! Public input types: what an importer hands to the annotator.
//!
//! # Example
//!
//! ```
//! use isomir_rs::reference::{Mature, Precursor, ReferenceDb};
//! use isomir_rs::{AnnotateConfig, Annotator, Counts, Placement, ReadObservation};
//!
//! let hairpin = "TGGGATGAGGTAGTAGGTTGTATAGTTTTAGGGTCACACCCACCACTGGGAGATAACTATACAATCTACTGTCTTTCC";
//! let mature = Mature {
//!     name: "hsa-let-7a-5p".to_string(),
//!     precursor: "hsa-let-7a-1".to_string(),
//!     start: 5,
//!     end: 26,
//! };
//! let reference = ReferenceDb::new(vec![Precursor::new("hsa-let-7a-1", hairpin)], vec![mature])?;
//! let annotator = Annotator::new(&reference, AnnotateConfig::default());
//!
//! let read = ReadObservation::new("TGAGGTAGTAGGTTGTATAGTTAA", "hsa-let-7a-1")
//!     .with_counts(Counts::Single(12))
//!     .with_placement(Placement::Unaligned);
//! let record = annotator.annotate(&read)?;
//! assert_eq!(record.attributes.get("Variant"), Some("iso_add:2"));
//! # Ok::<(), isomir_rs::Error>(())
//! ```

use crate::cigar::Cigar;
use crate::types::Strand;
use indexmap::IndexMap;

/// Expression of one read: a single count or one count per sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Counts {
    Single(u64),
    PerSample(IndexMap<String, u64>),
}

impl Default for Counts {
    fn default() -> Self {
        Counts::Single(1)
    }
}

impl Counts {
    pub fn total(&self) -> u64 {
        match self {
            Counts::Single(n) => *n,
            Counts::PerSample(map) => map.values().sum(),
        }
    }

    /// Values in sample order, zero for samples the read was not seen in.
    pub fn values_for(&self, samples: &[String]) -> Vec<u64> {
        match self {
            Counts::Single(n) => vec![*n],
            Counts::PerSample(map) => samples
                .iter()
                .map(|s| map.get(s).copied().unwrap_or(0))
                .collect(),
        }
    }
}

/// Where the importer placed the read, if anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Placement {
    /// Aligned by an external tool: 0-based start on the precursor and CIGAR.
    Aligned { start: i64, cigar: Cigar },
    /// Only the precursor is known; the annotator aligns the read itself.
    #[default]
    Unaligned,
}

/// One collapsed read as produced by an importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadObservation {
    pub sequence: String,
    pub counts: Counts,
    /// Precursor (hairpin) id the read maps to.
    pub precursor: String,
    pub strand: Strand,
    pub placement: Placement,
}

impl ReadObservation {
    pub fn new(sequence: impl Into<String>, precursor: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
            counts: Counts::default(),
            precursor: precursor.into(),
            strand: Strand::Forward,
            placement: Placement::Unaligned,
        }
    }

    pub fn with_counts(mut self, counts: Counts) -> Self {
        self.counts = counts;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }
}
