//! Compact, reversible identifiers for short nucleotide fragments.
//!
//! Every full trinucleotide becomes one symbol of a 64-character alphabet,
//! indexed as `16 * b0 + 4 * b1 + b2` with `A=0, C=1, G=2, T=3`. A trailing
//! remainder of one or two bases is padded with `A` to a full triplet and the
//! pad length follows as a digit, so `AAACCCTTTGGGA` encodes as `@#%$@2`.

use crate::error::{Error, Result};
use crate::sequence;

const SYMBOLS: &[u8; 64] = b"@abcdefhijklgmnopqrst#uvwxyzABCDEFGHIJKLMN$OPQRSTUVWXYZ&+=!?<>*%";
const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];
const PAD: u8 = b'A';

fn base_index(base: u8) -> usize {
    match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        _ => 3,
    }
}

fn symbol_index(symbol: u8) -> Option<usize> {
    SYMBOLS.iter().position(|&s| s == symbol)
}

fn triplet_symbol(triplet: &[u8]) -> char {
    let idx = triplet
        .iter()
        .fold(0usize, |acc, &b| acc * 4 + base_index(b));
    SYMBOLS[idx] as char
}

fn symbol_triplet(idx: usize) -> [u8; 3] {
    [BASES[idx / 16], BASES[(idx / 4) % 4], BASES[idx % 4]]
}

/// Encode a nucleotide sequence into its compact token.
pub fn encode(seq: &str) -> Result<String> {
    if !sequence::is_sequence(seq) {
        return Err(Error::InvalidSequence(seq.to_string()));
    }
    let seq = seq.to_ascii_uppercase();
    let bytes = seq.as_bytes();

    let mut token = String::with_capacity(bytes.len() / 3 + 2);
    let mut chunks = bytes.chunks_exact(3);
    for triplet in chunks.by_ref() {
        token.push(triplet_symbol(triplet));
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let pad = 3 - rest.len();
        let mut triplet = rest.to_vec();
        triplet.resize(3, PAD);
        token.push(triplet_symbol(&triplet));
        token.push(char::from(b'0' + pad as u8));
    }
    Ok(token)
}

/// Decode a compact token back into its nucleotide sequence.
pub fn decode(token: &str) -> Result<String> {
    let invalid = || Error::InvalidCode(token.to_string());
    let bytes = token.as_bytes();
    if bytes.is_empty() {
        return Err(invalid());
    }

    let mut out = Vec::with_capacity(bytes.len() * 3);
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(idx) = symbol_index(b) {
            out.extend_from_slice(&symbol_triplet(idx));
            continue;
        }

        // A pad digit is only valid as the last character, right after a symbol.
        let pad = match b {
            b'1' => 1,
            b'2' => 2,
            _ => return Err(invalid()),
        };
        if i + 1 != bytes.len() || i == 0 {
            return Err(invalid());
        }
        let keep = out.len() - pad;
        if out[keep..].iter().any(|&base| base != PAD) {
            return Err(invalid());
        }
        out.truncate(keep);
    }

    Ok(out.into_iter().map(char::from).collect())
}

/// Identifier shared by every observation of the same read sequence.
///
/// The read sequence is fully determined by precursor, mature and variant
/// signature, so identical isomiRs collapse onto one UID across samples.
pub fn uid(read: &str) -> Result<String> {
    Ok(format!("iso-{}-{}", read.len(), encode(read)?))
}

/// Read sequence of a UID built by [`uid`]. The length field must agree.
pub fn decode_uid(uid: &str) -> Result<String> {
    let invalid = || Error::InvalidCode(uid.to_string());
    let (len, code) = uid
        .strip_prefix("iso-")
        .and_then(|rest| rest.split_once('-'))
        .ok_or_else(invalid)?;
    let len: usize = len.parse().map_err(|_| invalid())?;
    let read = decode(code)?;
    if read.len() != len {
        return Err(invalid());
    }
    Ok(read)
}
