//! isomiR variant signatures: classification from alignment geometry, the
//! inverse reconstruction, and the `iso_*` variant string grammar.

use crate::cigar::{Cigar, CigarOp};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

pub const KEY_5P: &str = "iso_5p";
pub const KEY_3P: &str = "iso_3p";
pub const KEY_ADD: &str = "iso_add";
pub const KEY_ADD_3P: &str = "iso_add3p";
pub const KEY_SNP_CENTRAL: &str = "iso_snp_central";
pub const KEY_SNP_CENTRAL_SUPP: &str = "iso_snp_central_supp";

/// Rendering used for a read identical to its mature.
pub const CANONICAL: &str = "NA";

/// A base change at an alignment column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Substitution {
    /// 0-based column from the start of the alignment.
    pub position: usize,
    pub reference: u8,
    pub observed: u8,
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.position,
            char::from(self.reference),
            char::from(self.observed)
        )
    }
}

/// How a read differs from its mature miRNA.
///
/// Both offsets use the same convention: negative values are bases of
/// extension past the mature boundary, positive values are trimmed bases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantSignature {
    pub five_prime_offset: i32,
    pub three_prime_offset: i32,
    pub addition_length: u32,
    /// Literal untemplated 3' bases; empty when only the length is known.
    pub added_bases: String,
    pub substitutions: Vec<Substitution>,
    pub has_central_substitution: bool,
    pub has_supplementary_central_substitution: bool,
}

impl VariantSignature {
    /// True for the signature of a read identical to its mature.
    pub fn is_reference(&self) -> bool {
        self.five_prime_offset == 0
            && self.three_prime_offset == 0
            && self.addition_length == 0
            && self.substitutions.is_empty()
            && !self.has_central_substitution
            && !self.has_supplementary_central_substitution
    }

    /// Variant string keys carrying a non-zero or true value, in rendering order.
    pub fn populated_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.five_prime_offset != 0 {
            keys.push(KEY_5P);
        }
        if self.three_prime_offset != 0 {
            keys.push(KEY_3P);
        }
        if self.addition_length != 0 {
            keys.push(KEY_ADD);
        }
        if self.has_central_substitution {
            keys.push(KEY_SNP_CENTRAL);
        }
        if self.has_supplementary_central_substitution {
            keys.push(KEY_SNP_CENTRAL_SUPP);
        }
        keys
    }
}

fn signed(value: i32) -> String {
    if value > 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

impl fmt::Display for VariantSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<String> = Vec::new();
        for key in self.populated_keys() {
            let token = match key {
                KEY_5P => format!("{key}:{}", signed(self.five_prime_offset)),
                KEY_3P => format!("{key}:{}", signed(self.three_prime_offset)),
                KEY_ADD => format!("{key}:{}", self.addition_length),
                _ => key.to_string(),
            };
            tokens.push(token);
        }
        if tokens.is_empty() {
            return write!(f, "{CANONICAL}");
        }
        write!(f, "{}", tokens.join(","))
    }
}

impl FromStr for VariantSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_variant_string(s)
    }
}

fn parse_value<T: FromStr>(key: &str, value: Option<&str>) -> Result<T> {
    let raw = value.unwrap_or("");
    raw.trim().parse().map_err(|_| Error::InvalidVariantValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a comma-separated `iso_*` variant string.
pub fn parse_variant_string(s: &str) -> Result<VariantSignature> {
    let mut signature = VariantSignature::default();
    let s = s.trim();
    if s.is_empty() || s == CANONICAL {
        return Ok(signature);
    }

    for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (key, value) = match token.split_once(':') {
            Some((k, v)) => (k, Some(v)),
            None => (token, None),
        };
        match key {
            KEY_5P => signature.five_prime_offset = parse_value(key, value)?,
            KEY_3P => signature.three_prime_offset = parse_value(key, value)?,
            KEY_ADD | KEY_ADD_3P => signature.addition_length = parse_value(key, value)?,
            KEY_SNP_CENTRAL | KEY_SNP_CENTRAL_SUPP => {
                if let Some(v) = value {
                    return Err(Error::InvalidVariantValue {
                        key: key.to_string(),
                        value: v.to_string(),
                    });
                }
                if key == KEY_SNP_CENTRAL {
                    signature.has_central_substitution = true;
                } else {
                    signature.has_supplementary_central_substitution = true;
                }
            }
            _ => return Err(Error::UnknownVariantKey(key.to_string())),
        }
    }
    Ok(signature)
}

pub fn render_variant_string(signature: &VariantSignature) -> String {
    signature.to_string()
}

/// Classification windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Substitutions this close to either templated end are terminal.
    pub terminal_window: usize,
    /// Number of 3' columns inspected for untemplated additions.
    pub addition_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            terminal_window: 2,
            addition_window: 3,
        }
    }
}

/// Position of a mature arm within its precursor (0-based, `end` inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatureBounds {
    pub start: usize,
    pub end: usize,
}

/// A mature arm together with its precursor sequence.
#[derive(Debug, Clone, Copy)]
pub struct MatureSequence<'a> {
    pub precursor: &'a str,
    pub bounds: MatureBounds,
}

impl<'a> MatureSequence<'a> {
    pub fn sequence(&self) -> Option<&'a str> {
        self.precursor.get(self.bounds.start..=self.bounds.end)
    }
}

/// A read placed on its precursor.
#[derive(Debug, Clone, Copy)]
pub struct ReadAlignment<'a> {
    pub read: &'a str,
    pub precursor: &'a str,
    /// 0-based position of the first reference column on the precursor.
    pub start: i64,
    pub cigar: &'a Cigar,
}

#[derive(Debug, Clone, Copy)]
struct Column {
    op: CigarOp,
    ref_pos: usize,
    read_base: u8,
    ref_base: u8,
}

fn columns(aln: &ReadAlignment<'_>) -> Result<Vec<Column>> {
    if aln.start < 0 {
        return Err(Error::OutOfBoundsVariant(format!(
            "alignment starts at {} before the precursor",
            aln.start
        )));
    }
    let start = aln.start as usize;
    let read = aln.read.as_bytes();
    let precursor = aln.precursor.as_bytes();

    if aln.cigar.query_len() != read.len() {
        return Err(Error::CigarLengthMismatch {
            side: "query",
            cigar: aln.cigar.query_len(),
            sequence: read.len(),
        });
    }
    let ref_end = start + aln.cigar.reference_len();
    if ref_end > precursor.len() {
        return Err(Error::OutOfBoundsVariant(format!(
            "alignment ends at {ref_end} past the precursor length {}",
            precursor.len()
        )));
    }

    let mut cols = Vec::with_capacity(read.len() + aln.cigar.reference_len());
    let mut qpos = 0usize;
    let mut rpos = start;
    for op in aln.cigar.expand() {
        let col = match op {
            CigarOp::Match => Column {
                op,
                ref_pos: rpos,
                read_base: read[qpos].to_ascii_uppercase(),
                ref_base: precursor[rpos].to_ascii_uppercase(),
            },
            CigarOp::Ins => Column {
                op,
                ref_pos: rpos,
                read_base: read[qpos].to_ascii_uppercase(),
                ref_base: b'-',
            },
            CigarOp::Del => Column {
                op,
                ref_pos: rpos,
                read_base: b'-',
                ref_base: precursor[rpos].to_ascii_uppercase(),
            },
        };
        if op.consumes_query() {
            qpos += 1;
        }
        if op.consumes_reference() {
            rpos += 1;
        }
        cols.push(col);
    }
    Ok(cols)
}

/// Derive the variant signature of a read against its mature arm.
pub fn classify(
    aln: &ReadAlignment<'_>,
    mature: MatureBounds,
    config: &ClassifierConfig,
) -> Result<VariantSignature> {
    let cols = columns(aln)?;

    let first = cols
        .iter()
        .position(|c| c.op != CigarOp::Del)
        .ok_or_else(|| Error::OutOfBoundsVariant("alignment has no read bases".to_string()))?;
    if cols[first].op == CigarOp::Ins {
        return Err(Error::OutOfBoundsVariant(
            "untemplated bases at the 5' end".to_string(),
        ));
    }

    // Trailing insertions are untemplated; trailing deletions are dropped.
    let mut templated_end = cols.len();
    while templated_end > first && cols[templated_end - 1].op != CigarOp::Match {
        templated_end -= 1;
    }

    // A mismatch near the 3' end starts an addition, unless it is a lone
    // mismatch in the first column of the window.
    let window_start = templated_end
        .saturating_sub(config.addition_window)
        .max(first);
    let window = &cols[window_start..templated_end];
    if window.iter().all(|c| c.op == CigarOp::Match) {
        let errors: Vec<usize> = window
            .iter()
            .enumerate()
            .filter(|(_, c)| c.read_base != c.ref_base)
            .map(|(i, _)| i)
            .collect();
        let lone_leading = errors == [0] && window.len() == config.addition_window;
        if let Some(&first_error) = errors.first()
            && !lone_leading
        {
            templated_end = window_start + first_error;
        }
    }

    let templated = &cols[first..templated_end];
    if templated.is_empty() {
        return Err(Error::OutOfBoundsVariant(
            "read has no templated bases".to_string(),
        ));
    }
    if let Some(offset) = templated.iter().position(|c| c.op != CigarOp::Match) {
        return Err(Error::InternalIndel(first + offset));
    }

    let start = templated[0].ref_pos;
    let end = templated[templated.len() - 1].ref_pos;
    if end < mature.start || start > mature.end {
        return Err(Error::OutOfBoundsVariant(format!(
            "read {}..={} does not overlap mature {}..={}",
            start, end, mature.start, mature.end
        )));
    }

    let mut signature = VariantSignature {
        five_prime_offset: start as i32 - mature.start as i32,
        three_prime_offset: mature.end as i32 - end as i32,
        ..VariantSignature::default()
    };

    let len = templated.len();
    let window = config.terminal_window;
    let mut central = 0usize;
    for (position, col) in templated.iter().enumerate() {
        if col.read_base == col.ref_base {
            continue;
        }
        signature.substitutions.push(Substitution {
            position,
            reference: col.ref_base,
            observed: col.read_base,
        });
        let terminal = position < window || position + window >= len;
        if !terminal {
            central += 1;
        }
    }
    signature.has_central_substitution = central >= 1;
    signature.has_supplementary_central_substitution = central >= 2;

    signature.added_bases = cols[templated_end..]
        .iter()
        .filter(|c| c.op.consumes_query())
        .map(|c| char::from(c.read_base))
        .collect();
    signature.addition_length = signature.added_bases.len() as u32;

    Ok(signature)
}

/// Rebuild the read described by `signature` on `mature`.
pub fn reconstruct(mature: &MatureSequence<'_>, signature: &VariantSignature) -> Result<String> {
    let precursor = mature.precursor.as_bytes();
    let start = mature.bounds.start as i64 + i64::from(signature.five_prime_offset);
    let end = mature.bounds.end as i64 - i64::from(signature.three_prime_offset);
    if start < 0 || end < start || end >= precursor.len() as i64 {
        return Err(Error::OutOfBoundsVariant(format!(
            "variant spans {start}..={end} on a precursor of length {}",
            precursor.len()
        )));
    }

    let mut seq: Vec<u8> = precursor[start as usize..=end as usize]
        .iter()
        .map(u8::to_ascii_uppercase)
        .collect();
    for sub in &signature.substitutions {
        match seq.get_mut(sub.position) {
            Some(base) if *base == sub.reference.to_ascii_uppercase() => {
                *base = sub.observed.to_ascii_uppercase();
            }
            _ => {
                return Err(Error::OutOfBoundsVariant(format!(
                    "substitution {sub} does not match the template"
                )));
            }
        }
    }

    if signature.added_bases.len() != signature.addition_length as usize {
        return Err(Error::IncompleteVariant(format!(
            "addition of {} bases with {:?} recorded",
            signature.addition_length, signature.added_bases
        )));
    }
    seq.extend(signature.added_bases.bytes().map(|b| b.to_ascii_uppercase()));

    Ok(seq.into_iter().map(char::from).collect())
}
