//! End-to-end runs of the isomir-rs binary on a small let-7a fixture.
//!
//! The fixtures are written to temporary files, so these tests need no data
//! checked out next to the crate.

mod common;

use common::{BROKEN_GFF, GFF3, HAIRPIN_FA, LET7A_5P, TWO_SAMPLE_GFF, temp_file};
use isomir_rs::annotation::{self, read_annotations, validate};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

// ── helpers ──────────────────────────────────────────────────────────────────

const LIVER_SAM: &str = "\
@HD\tVN:1.6\tSO:unsorted
@SQ\tSN:hsa-let-7a-1\tLN:78
seq_1_x12\t0\thsa-let-7a-1\t6\t255\t22M\t*\t0\t0\tTGAGGTAGTAGGTTGTATAGTT\t*
seq_2_x3\t0\thsa-let-7a-1\t6\t255\t22M2S\t*\t0\t0\tTGAGGTAGTAGGTTGTATAGTTAA\t*
seq_3_x5\t4\t*\t0\t0\t*\t*\t0\t0\tACGTACGTACGT\t*
seq_4_x9\t16\thsa-let-7a-1\t6\t255\t22M\t*\t0\t0\tTGAGGTAGTAGGTTGTATAGTT\t*
";

const BRAIN_SAM: &str = "\
@HD\tVN:1.6\tSO:unsorted
@SQ\tSN:hsa-let-7a-1\tLN:78
seq_1_x4\t0\thsa-let-7a-1\t6\t255\t22M\t*\t0\t0\tTGAGGTAGTAGGTTGTATAGTT\t*
seq_2_x8\t0\thsa-let-7a-1\t8\t255\t20M\t*\t0\t0\tAGGTAGTAGGTTGTATAGTT\t*
";

fn isomir_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_isomir-rs"))
}

fn run_binary(args: &[&str]) -> ExitStatus {
    Command::new(isomir_bin())
        .args(args)
        .arg("--quiet")
        .status()
        .expect("failed to spawn isomir-rs")
}

fn run_ok(args: &[&str]) {
    let status = run_binary(args);
    assert!(status.success(), "isomir-rs exited with status {status}");
}

fn annotate_sample(dir: &Path, sample: &str, sam: &str, threads: &str) -> PathBuf {
    let fasta = temp_file(HAIRPIN_FA, ".fa");
    let gff = temp_file(GFF3, ".gff3");
    let sam = temp_file(sam, ".sam");
    let out = dir.join(format!("{sample}.gff"));
    run_ok(&[
        "annotate",
        "--hairpin",
        fasta.path().to_str().unwrap(),
        "--gff",
        gff.path().to_str().unwrap(),
        "--species",
        "hsa",
        "--sam",
        sam.path().to_str().unwrap(),
        "--sample",
        sample,
        "-p",
        threads,
        "-o",
        out.to_str().unwrap(),
    ]);
    out
}

// ── tests ─────────────────────────────────────────────────────────────────────

/// Mapped forward reads are annotated; reverse and unmapped reads are dropped.
#[test]
fn annotate_writes_mirgff() {
    let dir = tempfile::tempdir().unwrap();
    let out = annotate_sample(dir.path(), "liver", LIVER_SAM, "1");

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("## mirGFF3. VERSION 1.0\n"));

    let parsed = read_annotations(BufReader::new(File::open(&out).unwrap())).unwrap();
    assert_eq!(parsed.samples, vec!["liver".to_string()]);
    assert!(parsed.rejected.is_empty());
    assert_eq!(parsed.records.len(), 2);

    let canonical = &parsed.records[0];
    assert_eq!(canonical.source, "miRBasev21");
    assert_eq!(canonical.feature_type, annotation::FEATURE_REFERENCE);
    assert_eq!(canonical.attributes.get(annotation::READ), Some(LET7A_5P));
    assert_eq!(canonical.attributes.get(annotation::EXPRESSION), Some("12"));

    let added = &parsed.records[1];
    assert_eq!(added.attributes.get(annotation::VARIANT), Some("iso_add:2"));
    assert_eq!(added.attributes.get(annotation::EXPRESSION), Some("3"));

    let report = validate(BufReader::new(File::open(&out).unwrap())).unwrap();
    assert!(report.is_valid(), "{:?}", report.problems);
    run_ok(&["validate", out.to_str().unwrap()]);
}

/// Output is identical for serial and threaded runs.
#[test]
fn annotate_threads_do_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    let serial = annotate_sample(dir.path(), "serial", LIVER_SAM, "1");
    let threaded = annotate_sample(dir.path(), "threaded", LIVER_SAM, "4");
    let strip = |path: &Path| {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.starts_with("## COLDATA"))
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&serial), strip(&threaded));
}

/// Two annotated samples merge into one count table with explicit zeros.
#[test]
fn merge_writes_count_table() {
    let dir = tempfile::tempdir().unwrap();
    let liver = annotate_sample(dir.path(), "liver", LIVER_SAM, "1");
    let brain = annotate_sample(dir.path(), "brain", BRAIN_SAM, "1");
    let table = dir.path().join("counts.tsv");

    run_ok(&[
        "merge",
        "-o",
        table.to_str().unwrap(),
        liver.to_str().unwrap(),
        brain.to_str().unwrap(),
    ]);

    let text = fs::read_to_string(&table).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "chrom\tstart\tUID\tVariant\tCigar\tliver\tbrain");
    assert_eq!(lines.len(), 4);

    let rows: Vec<Vec<&str>> = lines[1..].iter().map(|l| l.split('\t').collect()).collect();
    // Ordered by start: canonical and addition at 6, trimmed read at 8.
    assert_eq!(rows[0][1], "6");
    assert_eq!(rows[1][1], "6");
    assert_eq!(rows[2][1], "8");

    let canonical = rows.iter().find(|r| r[3] == "NA").unwrap();
    assert_eq!(&canonical[5..], ["12", "4"]);
    let addition = rows.iter().find(|r| r[3] == "iso_add:2").unwrap();
    assert_eq!(&addition[5..], ["3", "0"]);
    let trimmed = rows.iter().find(|r| r[3] == "iso_5p:+2").unwrap();
    assert_eq!(&trimmed[5..], ["0", "8"]);
}

/// Sample columns of a multi-sample input survive the merge.
#[test]
fn merge_keeps_multi_sample_columns() {
    let dir = tempfile::tempdir().unwrap();
    let liver = annotate_sample(dir.path(), "liver", LIVER_SAM, "1");
    let pair = temp_file(TWO_SAMPLE_GFF, ".gff");
    let table = dir.path().join("counts.tsv");

    run_ok(&[
        "merge",
        "-o",
        table.to_str().unwrap(),
        liver.to_str().unwrap(),
        pair.path().to_str().unwrap(),
    ]);

    let text = fs::read_to_string(&table).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "chrom\tstart\tUID\tVariant\tCigar\tliver\ts1\ts2");
    let canonical: Vec<&str> = lines[1..]
        .iter()
        .map(|l| l.split('\t').collect::<Vec<_>>())
        .find(|r| r[3] == "NA")
        .unwrap();
    assert_eq!(&canonical[5..], ["12", "3", "5"]);
}

#[test]
fn validate_fails_on_broken_file() {
    let broken = temp_file(BROKEN_GFF, ".gff");
    let status = run_binary(&["validate", broken.path().to_str().unwrap()]);
    assert!(!status.success());
}
