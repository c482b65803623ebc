//! Local alignment of a read against a short reference fragment.

use crate::cigar::{self, Cigar};

/// Linear-gap scoring scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_score: i32,
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            match_score: 2,
            mismatch_score: -1,
            gap_score: -1,
        }
    }
}

impl Scoring {
    fn pair(&self, a: u8, b: u8) -> i32 {
        if a.eq_ignore_ascii_case(&b) {
            self.match_score
        } else {
            self.mismatch_score
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stop,
    Diagonal,
    /// Reference base against a query gap.
    Deletion,
    /// Query base against a reference gap.
    Insertion,
}

/// Row-major score and traceback tables with a zero first row and column.
struct Matrix {
    cols: usize,
    score: Vec<i32>,
    step: Vec<Step>,
}

impl Matrix {
    fn new(rows: usize, cols: usize) -> Self {
        let size = (rows + 1) * (cols + 1);
        Self {
            cols: cols + 1,
            score: vec![0; size],
            step: vec![Step::Stop; size],
        }
    }

    fn at(&self, i: usize, j: usize) -> usize {
        i * self.cols + j
    }

    /// Score cell `(i, j)`; ties prefer the diagonal, then a deletion.
    fn fill(&mut self, i: usize, j: usize, pair: i32, gap: i32) -> i32 {
        let diagonal = self.score[self.at(i - 1, j - 1)] + pair;
        let deletion = self.score[self.at(i - 1, j)] + gap;
        let insertion = self.score[self.at(i, j - 1)] + gap;
        let cell = diagonal.max(deletion).max(insertion).max(0);

        let step = if cell == 0 {
            Step::Stop
        } else if cell == diagonal {
            Step::Diagonal
        } else if cell == deletion {
            Step::Deletion
        } else {
            Step::Insertion
        };
        let idx = self.at(i, j);
        self.score[idx] = cell;
        self.step[idx] = step;
        cell
    }

    fn step(&self, i: usize, j: usize) -> Step {
        if i == 0 || j == 0 {
            return Step::Stop;
        }
        self.step[self.at(i, j)]
    }
}

/// Gapped reference/query pair produced by [`align`].
///
/// `reference` and `query` have equal length and use `-` for gaps. The
/// `*_start`/`*_end` fields give the aligned span (0-based, end exclusive) on
/// each ungapped input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alignment {
    pub reference: String,
    pub query: String,
    pub score: i32,
    pub reference_start: usize,
    pub reference_end: usize,
    pub query_start: usize,
    pub query_end: usize,
}

impl Alignment {
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Run-length CIGAR of the aligned columns.
    pub fn cigar(&self) -> Cigar {
        // Both rows come from the traceback, so they are always column-consistent.
        Cigar::from_gapped(&self.reference, &self.query).unwrap_or_default()
    }
}

/// Align `query` against `reference` with the default scoring.
pub fn align(reference: &str, query: &str) -> Alignment {
    align_with(reference, query, &Scoring::default())
}

/// Smith-Waterman local alignment with deterministic, left-most gap placement.
///
/// The traceback prefers a diagonal step, then a deletion, then an insertion,
/// which pushes gaps towards the start of the alignment; the gapped pair is
/// then left-normalized so homopolymer ties always resolve the same way.
pub fn align_with(reference: &str, query: &str, scoring: &Scoring) -> Alignment {
    let reference = reference.as_bytes();
    let query = query.as_bytes();
    if reference.is_empty() || query.is_empty() {
        return Alignment::default();
    }

    let mut matrix = Matrix::new(reference.len(), query.len());
    let mut best = (0i32, 0usize, 0usize);
    for (i, &r) in reference.iter().enumerate().map(|(i, r)| (i + 1, r)) {
        for (j, &q) in query.iter().enumerate().map(|(j, q)| (j + 1, q)) {
            let cell = matrix.fill(i, j, scoring.pair(r, q), scoring.gap_score);
            if cell > best.0 {
                best = (cell, i, j);
            }
        }
    }

    let (max_score, max_i, max_j) = best;
    if max_score == 0 {
        return Alignment::default();
    }

    let (mut i, mut j) = (max_i, max_j);
    let mut ref_row: Vec<u8> = Vec::with_capacity(max_i + max_j);
    let mut query_row: Vec<u8> = Vec::with_capacity(max_i + max_j);
    loop {
        match matrix.step(i, j) {
            Step::Diagonal => {
                ref_row.push(reference[i - 1]);
                query_row.push(query[j - 1]);
                i -= 1;
                j -= 1;
            }
            Step::Deletion => {
                ref_row.push(reference[i - 1]);
                query_row.push(b'-');
                i -= 1;
            }
            Step::Insertion => {
                ref_row.push(b'-');
                query_row.push(query[j - 1]);
                j -= 1;
            }
            Step::Stop => break,
        }
    }

    ref_row.reverse();
    query_row.reverse();
    cigar::left_align(&mut ref_row, &mut query_row);

    Alignment {
        reference: ref_row.into_iter().map(char::from).collect(),
        query: query_row.into_iter().map(char::from).collect(),
        score: max_score,
        reference_start: i,
        reference_end: max_i,
        query_start: j,
        query_end: max_j,
    }
}
