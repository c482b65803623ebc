//! Error type shared by the annotation core.

use thiserror::Error;

/// Errors raised while aligning, classifying, encoding or merging reads.
///
/// Reference errors are fatal for a run; everything else concerns a single
/// read or record, which is skipped and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A sequence contains characters outside `ACGT`.
    #[error("invalid nucleotide sequence: {0:?}")]
    InvalidSequence(String),

    /// A compact identifier could not be decoded.
    #[error("invalid compact code: {0:?}")]
    InvalidCode(String),

    /// The CIGAR does not consume exactly the supplied sequence.
    #[error("CIGAR {side} length {cigar} does not match sequence length {sequence}")]
    CigarLengthMismatch {
        side: &'static str,
        cigar: usize,
        sequence: usize,
    },

    /// The read geometry falls outside the precursor or the mature arm.
    #[error("variant out of bounds: {0}")]
    OutOfBoundsVariant(String),

    /// A variant string carries a key outside the isomiR vocabulary.
    #[error("unknown variant key: {0:?}")]
    UnknownVariantKey(String),

    /// A known variant key carries an unparsable value.
    #[error("invalid value for variant key {key}: {value:?}")]
    InvalidVariantValue { key: String, value: String },

    /// Two records share an identity key but describe different variants.
    #[error("conflicting annotation for {key}: {field} {first:?} != {second:?}")]
    ConflictingAnnotation {
        key: String,
        field: &'static str,
        first: String,
        second: String,
    },

    /// An insertion or deletion inside the templated part of the read.
    #[error("indel at alignment column {0} cannot be expressed as an isomiR variant")]
    InternalIndel(usize),

    /// A signature with an addition length but no added bases.
    #[error("incomplete variant: {0}")]
    IncompleteVariant(String),

    /// Reads aligned to the reverse strand of a hairpin are not annotated.
    #[error("read aligned to the {0} strand of its precursor")]
    UnsupportedStrand(char),

    /// Applying the derived signature to the mature did not give back the read.
    #[error("reconstructed sequence {expected} differs from read {observed}")]
    ReconstructionMismatch { expected: String, observed: String },

    /// An annotation line that cannot be parsed.
    #[error("malformed annotation record: {0}")]
    MalformedRecord(String),

    /// A precursor id with no reference sequence.
    #[error("missing reference precursor: {0}")]
    MissingReference(String),

    /// Reference tables that contradict each other.
    #[error("malformed reference: {0}")]
    MalformedReference(String),
}

impl Error {
    /// True for errors that invalidate the whole run rather than one read.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingReference(_) | Self::MalformedReference(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
