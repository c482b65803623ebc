use std::fmt;

// Fast hash maps / sets using AHash instead of the default SipHash.
// Import these throughout the codebase with `use crate::types::{HashMap, HashSet}`.
// Also import `HashMapExt` / `HashSetExt` when you need `::new()` or `::with_capacity()`.
pub(crate) type HashMap<K, V> = ahash::HashMap<K, V>;
pub(crate) type HashSet<K> = ahash::HashSet<K>;
pub(crate) use ahash::HashMapExt;
pub(crate) use ahash::HashSetExt;

/// Strand of a read or feature relative to its precursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
    Unknown,
}

impl Strand {
    /// Parse the GFF strand column. Anything other than `+`/`-` is unknown.
    pub fn from_column(s: &str) -> Self {
        match s {
            "+" => Self::Forward,
            "-" => Self::Reverse,
            _ => Self::Unknown,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
            Self::Unknown => '.',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
