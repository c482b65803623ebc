use crate::error::{Error, Result};

fn complement(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(b'T'),
        b'T' | b't' => Some(b'A'),
        b'C' | b'c' => Some(b'G'),
        b'G' | b'g' => Some(b'C'),
        _ => None,
    }
}

/// True if `seq` is non-empty and made only of `ACGT` (either case).
pub fn is_sequence(seq: &str) -> bool {
    !seq.is_empty() && seq.bytes().all(|b| complement(b).is_some())
}

/// Reverse complement of a DNA sequence, uppercased.
pub fn reverse_complement(seq: &str) -> Result<String> {
    seq.bytes()
        .rev()
        .map(|base| {
            complement(base)
                .map(char::from)
                .ok_or_else(|| Error::InvalidSequence(seq.to_string()))
        })
        .collect()
}

/// Uppercase a read or reference sequence and convert RNA `U` to `T`.
///
/// The result is validated with [`is_sequence`].
pub fn normalize(seq: &str) -> Result<String> {
    let normalized: String = seq
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'U' => 'T',
            other => other,
        })
        .collect();
    if !is_sequence(&normalized) {
        return Err(Error::InvalidSequence(seq.to_string()));
    }
    Ok(normalized)
}
