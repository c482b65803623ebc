//! Run-length CIGARs over Match/Insertion/Deletion, indel canonicalization and
//! SNP extraction.
//!
//! Insertions consume the read (query) only, deletions the reference only.

use crate::error::{Error, Result};
use crate::sw::Alignment;
use crate::variant::Substitution;
use noodles::sam::alignment::record::cigar::{op::Kind as CigarKind, Op as SamCigarOp};
use std::fmt;
use std::str::FromStr;

const GAP: u8 = b'-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CigarOp {
    #[default]
    Match,
    Ins,
    Del,
}

impl CigarOp {
    pub fn as_char(self) -> char {
        match self {
            CigarOp::Match => 'M',
            CigarOp::Ins => 'I',
            CigarOp::Del => 'D',
        }
    }

    pub fn consumes_reference(self) -> bool {
        matches!(self, CigarOp::Match | CigarOp::Del)
    }

    pub fn consumes_query(self) -> bool {
        matches!(self, CigarOp::Match | CigarOp::Ins)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cigar {
    pub ops: Vec<(u32, CigarOp)>,
}

impl Cigar {
    pub fn add_operation(&mut self, len: u32, op: CigarOp) {
        if len == 0 {
            return;
        }
        if let Some((prev_len, prev_op)) = self.ops.last_mut()
            && *prev_op == op
        {
            *prev_len += len;
            return;
        }
        self.ops.push((len, op));
    }

    pub fn prepend_operation(&mut self, len: u32, op: CigarOp) {
        if len == 0 {
            return;
        }
        if let Some((prev_len, prev_op)) = self.ops.first_mut()
            && *prev_op == op
        {
            *prev_len += len;
            return;
        }
        self.ops.insert(0, (len, op));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of reference bases consumed (Match + Deletion).
    pub fn reference_len(&self) -> usize {
        self.ops
            .iter()
            .filter(|(_, op)| op.consumes_reference())
            .map(|(len, _)| *len as usize)
            .sum()
    }

    /// Number of query bases consumed (Match + Insertion).
    pub fn query_len(&self) -> usize {
        self.ops
            .iter()
            .filter(|(_, op)| op.consumes_query())
            .map(|(len, _)| *len as usize)
            .sum()
    }

    pub fn expand(&self) -> Expand<'_> {
        expand(self)
    }

    /// Split leading and trailing insertions off the aligned core.
    pub fn split_terminal_insertions(&self) -> (u32, Cigar, u32) {
        let mut ops = self.ops.as_slice();
        let mut lead = 0;
        let mut trail = 0;
        while let Some(((len, CigarOp::Ins), rest)) = ops.split_first() {
            lead += *len;
            ops = rest;
        }
        while let Some(((len, CigarOp::Ins), rest)) = ops.split_last() {
            trail += *len;
            ops = rest;
        }
        (lead, Cigar { ops: ops.to_vec() }, trail)
    }

    /// Minimal CIGAR from two equal-length gapped rows.
    pub fn from_gapped(reference: &str, query: &str) -> Result<Self> {
        let r = reference.as_bytes();
        let q = query.as_bytes();
        if r.len() != q.len() {
            return Err(Error::CigarLengthMismatch {
                side: "gapped",
                cigar: r.len(),
                sequence: q.len(),
            });
        }

        let mut cigar = Cigar::default();
        for (col, (&rb, &qb)) in r.iter().zip(q).enumerate() {
            let op = match (rb == GAP, qb == GAP) {
                (false, false) => CigarOp::Match,
                (true, false) => CigarOp::Ins,
                (false, true) => CigarOp::Del,
                (true, true) => {
                    return Err(Error::CigarLengthMismatch {
                        side: "gapped",
                        cigar: col,
                        sequence: col + 1,
                    });
                }
            };
            cigar.add_operation(1, op);
        }
        Ok(cigar)
    }

    pub fn from_alignment(alignment: &Alignment) -> Result<Self> {
        Self::from_gapped(&alignment.reference, &alignment.query)
    }

    /// Convert SAM operations from an external aligner.
    ///
    /// Soft clips keep their bases as insertions; hard clips and padding are
    /// dropped. Spliced alignments are rejected.
    pub fn from_sam_ops(ops: &[SamCigarOp]) -> Result<Self> {
        let mut cigar = Cigar::default();
        for op in ops {
            let len = op.len() as u32;
            match op.kind() {
                CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch => {
                    cigar.add_operation(len, CigarOp::Match)
                }
                CigarKind::Insertion | CigarKind::SoftClip => cigar.add_operation(len, CigarOp::Ins),
                CigarKind::Deletion => cigar.add_operation(len, CigarOp::Del),
                CigarKind::HardClip | CigarKind::Pad => {}
                CigarKind::Skip => {
                    return Err(Error::MalformedRecord(
                        "reference skip (N) in a hairpin alignment".to_string(),
                    ));
                }
            }
        }
        Ok(cigar)
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return write!(f, "*");
        }
        for (len, op) in &self.ops {
            write!(f, "{}{}", len, op.as_char())?;
        }
        Ok(())
    }
}

impl FromStr for Cigar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut cigar = Cigar::default();
        if s == "*" {
            return Ok(cigar);
        }
        for (len, symbol) in parse_runs(s)? {
            // Clips follow the same rules as `from_sam_ops`.
            let op = match symbol {
                b'M' | b'=' | b'X' => CigarOp::Match,
                b'I' | b'S' => CigarOp::Ins,
                b'D' => CigarOp::Del,
                b'H' | b'P' => continue,
                _ => return Err(Error::MalformedRecord(format!("invalid CIGAR {s:?}"))),
            };
            cigar.add_operation(len, op);
        }
        Ok(cigar)
    }
}

/// One operation per alignment column. Restartable by cloning or calling
/// [`expand`] again.
#[derive(Debug, Clone)]
pub struct Expand<'a> {
    ops: &'a [(u32, CigarOp)],
    run: usize,
    offset: u32,
}

impl Iterator for Expand<'_> {
    type Item = CigarOp;

    fn next(&mut self) -> Option<CigarOp> {
        while let Some(&(len, op)) = self.ops.get(self.run) {
            if self.offset < len {
                self.offset += 1;
                return Some(op);
            }
            self.run += 1;
            self.offset = 0;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ops[self.run.min(self.ops.len())..]
            .iter()
            .map(|(len, _)| *len as usize)
            .sum::<usize>()
            .saturating_sub(self.offset as usize);
        (remaining, Some(remaining))
    }
}

pub fn expand(cigar: &Cigar) -> Expand<'_> {
    Expand {
        ops: &cigar.ops,
        run: 0,
        offset: 0,
    }
}

fn check_lengths(cigar: &Cigar, read: &[u8], reference: &[u8]) -> Result<()> {
    if cigar.query_len() != read.len() {
        return Err(Error::CigarLengthMismatch {
            side: "query",
            cigar: cigar.query_len(),
            sequence: read.len(),
        });
    }
    if cigar.reference_len() != reference.len() {
        return Err(Error::CigarLengthMismatch {
            side: "reference",
            cigar: cigar.reference_len(),
            sequence: reference.len(),
        });
    }
    Ok(())
}

fn layout(cigar: &Cigar, read: &[u8], reference: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    check_lengths(cigar, read, reference)?;

    let columns = cigar.query_len() + cigar.reference_len();
    let mut read_row = Vec::with_capacity(columns);
    let mut ref_row = Vec::with_capacity(columns);
    let mut qpos = 0usize;
    let mut rpos = 0usize;
    for op in cigar.expand() {
        match op {
            CigarOp::Match => {
                read_row.push(read[qpos]);
                ref_row.push(reference[rpos]);
                qpos += 1;
                rpos += 1;
            }
            CigarOp::Ins => {
                read_row.push(read[qpos]);
                ref_row.push(GAP);
                qpos += 1;
            }
            CigarOp::Del => {
                read_row.push(GAP);
                ref_row.push(reference[rpos]);
                rpos += 1;
            }
        }
    }
    Ok((read_row, ref_row))
}

/// Lay `read` and `reference` out along `cigar` and canonicalize every indel to
/// its left-most equivalent position.
///
/// Returns the gapped `(read, reference)` pair.
pub fn correct(cigar: &Cigar, read: &str, reference: &str) -> Result<(String, String)> {
    let (mut read_row, mut ref_row) = layout(cigar, read.as_bytes(), reference.as_bytes())?;
    left_align(&mut ref_row, &mut read_row);
    Ok((
        read_row.into_iter().map(char::from).collect(),
        ref_row.into_iter().map(char::from).collect(),
    ))
}

/// [`correct`], returned as a CIGAR.
pub fn correct_cigar(cigar: &Cigar, read: &str, reference: &str) -> Result<Cigar> {
    let (read_row, ref_row) = correct(cigar, read, reference)?;
    Cigar::from_gapped(&ref_row, &read_row)
}

/// Shift every gap run in either row as far left as the opposite row allows
/// without changing the score. A gap never moves into the first column.
pub fn left_align(a: &mut [u8], b: &mut [u8]) {
    debug_assert_eq!(a.len(), b.len());
    while shift_gaps_left(a, b) | shift_gaps_left(b, a) {}
}

fn shift_gaps_left(row: &mut [u8], other: &[u8]) -> bool {
    let mut moved = false;
    let mut s = 0usize;
    while s < row.len() {
        if row[s] != GAP {
            s += 1;
            continue;
        }
        let mut e = s;
        while e < row.len() && row[e] == GAP {
            e += 1;
        }

        let (mut start, mut end) = (s, e);
        while start > 1
            && row[start - 1] != GAP
            && other[start - 1] != GAP
            && other[end - 1] != GAP
            && other[start - 1].eq_ignore_ascii_case(&other[end - 1])
        {
            row[end - 1] = row[start - 1];
            row[start - 1] = GAP;
            start -= 1;
            end -= 1;
            moved = true;
        }
        s = e;
    }
    moved
}

/// Mismatches on Match columns, positioned by alignment column.
pub fn snps(cigar: &Cigar, read: &str, reference: &str) -> Result<Vec<Substitution>> {
    let (read_row, ref_row) = layout(cigar, read.as_bytes(), reference.as_bytes())?;
    Ok(read_row
        .iter()
        .zip(&ref_row)
        .enumerate()
        .filter(|(_, (q, r))| **q != GAP && **r != GAP && !q.eq_ignore_ascii_case(r))
        .map(|(position, (q, r))| Substitution {
            position,
            reference: r.to_ascii_uppercase(),
            observed: q.to_ascii_uppercase(),
        })
        .collect())
}

/// Mismatch-annotated CIGAR used in annotation records.
///
/// Matches print as `M`, mismatches as the reference base, indels as `I`/`D`;
/// runs longer than one carry a count, e.g. `11MA7M`.
pub fn mismatch_cigar(cigar: &Cigar, read: &str, reference: &str) -> Result<String> {
    let (read_row, ref_row) = layout(cigar, read.as_bytes(), reference.as_bytes())?;
    Ok(mismatch_cigar_from_rows(&ref_row, &read_row))
}

/// [`mismatch_cigar`] from an already gapped reference/query pair.
pub fn mismatch_cigar_from_gapped(reference: &str, query: &str) -> Result<String> {
    if reference.len() != query.len() {
        return Err(Error::CigarLengthMismatch {
            side: "gapped",
            cigar: reference.len(),
            sequence: query.len(),
        });
    }
    Ok(mismatch_cigar_from_rows(reference.as_bytes(), query.as_bytes()))
}

fn mismatch_cigar_from_rows(ref_row: &[u8], read_row: &[u8]) -> String {
    let symbols: Vec<u8> = ref_row
        .iter()
        .zip(read_row)
        .map(|(&r, &q)| {
            if r == GAP {
                b'I'
            } else if q == GAP {
                b'D'
            } else if r.eq_ignore_ascii_case(&q) {
                b'M'
            } else {
                r.to_ascii_uppercase()
            }
        })
        .collect();
    compress_symbols(&symbols)
}

fn compress_symbols(symbols: &[u8]) -> String {
    let mut out = String::new();
    let mut i = 0usize;
    while i < symbols.len() {
        let symbol = symbols[i];
        let mut run_len = 0usize;
        while i < symbols.len() && symbols[i] == symbol {
            run_len += 1;
            i += 1;
        }
        if run_len > 1 {
            out.push_str(&run_len.to_string());
        }
        out.push(char::from(symbol));
    }
    out
}

fn parse_runs(text: &str) -> Result<Vec<(u32, u8)>> {
    let malformed = || Error::MalformedRecord(format!("invalid CIGAR {text:?}"));
    if text.is_empty() {
        return Err(malformed());
    }

    let mut runs = Vec::new();
    let mut count: Option<u32> = None;
    for b in text.bytes() {
        if b.is_ascii_digit() {
            let digit = u32::from(b - b'0');
            let next = count
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|c| c.checked_add(digit))
                .ok_or_else(malformed)?;
            count = Some(next);
        } else {
            let len = count.take().unwrap_or(1);
            if len == 0 {
                return Err(malformed());
            }
            runs.push((len, b.to_ascii_uppercase()));
        }
    }
    if count.is_some() {
        return Err(malformed());
    }
    Ok(runs)
}

fn is_mismatch_symbol(b: u8) -> bool {
    matches!(b, b'A' | b'C' | b'G' | b'T')
}

/// Expand a mismatch-annotated CIGAR to one symbol per column.
pub fn expand_text(text: &str) -> Result<String> {
    let mut out = String::new();
    for (len, symbol) in parse_runs(text)? {
        if !matches!(symbol, b'M' | b'I' | b'D') && !is_mismatch_symbol(symbol) {
            return Err(Error::MalformedRecord(format!("invalid CIGAR {text:?}")));
        }
        out.extend(std::iter::repeat_n(char::from(symbol), len as usize));
    }
    Ok(out)
}

/// Substitutions recorded in a mismatch-annotated CIGAR, with the observed
/// bases taken from `read`.
pub fn snps_from_text(text: &str, read: &str) -> Result<Vec<Substitution>> {
    let expanded = expand_text(text)?;
    let read = read.as_bytes();
    let consumed = expanded.bytes().filter(|&s| s != b'D').count();
    if consumed != read.len() {
        return Err(Error::CigarLengthMismatch {
            side: "query",
            cigar: consumed,
            sequence: read.len(),
        });
    }

    let mut subs = Vec::new();
    let mut qpos = 0usize;
    for (position, symbol) in expanded.bytes().enumerate() {
        match symbol {
            b'D' => {}
            b'M' | b'I' => qpos += 1,
            reference => {
                subs.push(Substitution {
                    position,
                    reference,
                    observed: read[qpos].to_ascii_uppercase(),
                });
                qpos += 1;
            }
        }
    }
    Ok(subs)
}
