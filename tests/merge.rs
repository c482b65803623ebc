mod common;

use common::{Recorder, TWO_SAMPLE_GFF};
use isomir_rs::annotation::{self, AnnotationRecord, Attributes, read_annotations};
use isomir_rs::merge::{IdentityKey, MergeTable, merge, merge_columns};
use std::io::Cursor;
use isomir_rs::{Error, Strand, TracingObserver};

fn record(chrom: &str, start: u64, uid: &str, variant: &str, expression: &str) -> AnnotationRecord {
    let attributes: Attributes = [
        (annotation::UID, uid),
        (annotation::VARIANT, variant),
        (annotation::CIGAR, "22M"),
        (annotation::EXPRESSION, expression),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    AnnotationRecord {
        chrom: chrom.to_string(),
        source: "miRBase".to_string(),
        feature_type: annotation::FEATURE_ISOMIR.to_string(),
        start,
        end: start + 21,
        score: ".".to_string(),
        strand: Strand::Forward,
        phase: ".".to_string(),
        attributes,
    }
}

fn samples(list: Vec<(&str, Vec<AnnotationRecord>)>) -> Vec<(String, Vec<AnnotationRecord>)> {
    list.into_iter().map(|(s, r)| (s.to_string(), r)).collect()
}

#[test]
fn identical_records_merge_into_one_row() {
    let observer = Recorder::default();
    let table = merge(
        samples(vec![
            ("sample1", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "1")]),
            ("sample2", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "2")]),
        ]),
        &observer,
    );

    let key = IdentityKey::new("hsa-let-7a-1", 6, "iso-22-A");
    assert_eq!(table.len(), 1);
    assert_eq!(table.count(&key, "sample1"), 1);
    assert_eq!(table.count(&key, "sample2"), 2);
    assert!(table.conflicts().is_empty());
    assert!(observer.conflicts.lock().unwrap().is_empty());
    assert!(table.ensure_consistent().is_ok());
}

#[test]
fn differing_variant_is_a_conflict() {
    let observer = Recorder::default();
    let table = merge(
        samples(vec![
            ("sample1", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "1")]),
            (
                "sample2",
                vec![record("hsa-let-7a-1", 6, "iso-22-A", "iso_5p:+1", "2")],
            ),
        ]),
        &observer,
    );

    let key = IdentityKey::new("hsa-let-7a-1", 6, "iso-22-A");
    let row = table.get(&key).unwrap();
    assert_eq!(row.variant(), "NA");
    assert_eq!(table.row_counts(row), vec![1, 2]);

    assert_eq!(table.conflicts().len(), 1);
    assert!(matches!(
        &table.conflicts()[0],
        Error::ConflictingAnnotation { field: "Variant", first, second, .. }
            if first == "NA" && second == "iso_5p:+1"
    ));
    assert_eq!(observer.conflicts.lock().unwrap().len(), 1);
    assert!(matches!(
        table.ensure_consistent(),
        Err(Error::ConflictingAnnotation { .. })
    ));
}

#[test]
fn missing_samples_count_zero() {
    let table = merge(
        samples(vec![
            ("a", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "4")]),
            ("b", vec![]),
            ("c", vec![record("hsa-let-7a-1", 7, "iso-21-B", "iso_5p:+1", "3")]),
        ]),
        &TracingObserver,
    );
    assert_eq!(table.samples(), ["a", "b", "c"]);
    let counts: Vec<Vec<u64>> = table.rows().map(|(_, row)| table.row_counts(row)).collect();
    assert_eq!(counts, vec![vec![4, 0, 0], vec![0, 0, 3]]);
    let key = IdentityKey::new("hsa-let-7a-1", 7, "iso-21-B");
    assert_eq!(table.count(&key, "a"), 0);
    assert_eq!(table.count(&key, "zzz"), 0);
}

#[test]
fn rows_are_ordered_by_chrom_start_uid() {
    let table = merge(
        samples(vec![(
            "s",
            vec![
                record("hsa-mir-b", 1, "iso-1-Z", "NA", "1"),
                record("hsa-mir-a", 9, "iso-1-B", "NA", "1"),
                record("hsa-mir-a", 9, "iso-1-A", "NA", "1"),
                record("hsa-mir-a", 2, "iso-1-C", "NA", "1"),
            ],
        )]),
        &TracingObserver,
    );
    let keys: Vec<String> = table.rows().map(|(key, _)| key.to_string()).collect();
    assert_eq!(
        keys,
        vec![
            "hsa-mir-a:2:iso-1-C",
            "hsa-mir-a:9:iso-1-A",
            "hsa-mir-a:9:iso-1-B",
            "hsa-mir-b:1:iso-1-Z",
        ]
    );
}

#[test]
fn expression_values_are_summed() {
    let table = merge(
        samples(vec![("s", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "1,2,3")])]),
        &TracingObserver,
    );
    let key = IdentityKey::new("hsa-let-7a-1", 6, "iso-22-A");
    assert_eq!(table.count(&key, "s"), 6);
}

#[test]
fn unplaceable_records_are_excluded() {
    let observer = Recorder::default();
    let no_uid = record("hsa-let-7a-1", 6, "", "NA", "1");
    let table = merge(
        samples(vec![(
            "s",
            vec![
                no_uid,
                record("hsa-let-7a-1", 6, "iso-22-A", "NA", "lots"),
                record("hsa-let-7a-1", 6, "iso-22-B", "NA", "5"),
            ],
        )]),
        &observer,
    );
    assert_eq!(table.len(), 1);
    assert_eq!(table.excluded(), 2);
    let excluded = observer.excluded.lock().unwrap();
    assert_eq!(excluded.len(), 2);
    assert!(
        excluded
            .iter()
            .all(|(sample, e)| sample == "s" && matches!(e, Error::MalformedRecord(_)))
    );
}

#[test]
fn absorb_matches_single_pass() {
    let input = vec![
        (
            "s1",
            vec![
                record("hsa-let-7a-1", 6, "iso-22-A", "NA", "1"),
                record("hsa-let-7a-1", 7, "iso-21-B", "iso_5p:+1", "2"),
            ],
        ),
        (
            "s2",
            vec![
                record("hsa-let-7a-1", 6, "iso-22-A", "iso_3p:+1", "5"),
                record("hsa-mir-100", 10, "iso-22-C", "NA", "3"),
            ],
        ),
        ("s3", vec![record("hsa-let-7a-1", 7, "iso-21-B", "iso_5p:+1", "4")]),
    ];
    let single = merge(samples(input.clone()), &TracingObserver);

    let mut reduced = MergeTable::new();
    for (sample, records) in samples(input) {
        let partial = merge(vec![(sample, records)], &TracingObserver);
        reduced.absorb(partial, &TracingObserver);
    }

    assert_eq!(reduced.samples(), single.samples());
    let rows = |t: &MergeTable| {
        t.rows()
            .map(|(k, r)| (k.clone(), r.variant().to_string(), t.row_counts(r)))
            .collect::<Vec<_>>()
    };
    assert_eq!(rows(&reduced), rows(&single));
    assert_eq!(reduced.conflicts(), single.conflicts());
    assert_eq!(single.conflicts().len(), 1);
}

#[test]
fn write_tsv_table() {
    let table = merge(
        samples(vec![
            ("s1", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "1")]),
            ("s2", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "2")]),
        ]),
        &TracingObserver,
    );
    let mut out = Vec::new();
    table.write_tsv(&mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "chrom\tstart\tUID\tVariant\tCigar\ts1\ts2\n\
         hsa-let-7a-1\t6\tiso-22-A\tNA\t22M\t1\t2\n"
    );
}

#[test]
fn merged_records_list_counts_per_sample() {
    let table = merge(
        samples(vec![
            ("s1", vec![]),
            ("s2", vec![record("hsa-let-7a-1", 6, "iso-22-A", "NA", "2")]),
        ]),
        &TracingObserver,
    );
    let records = table.to_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attributes.get(annotation::EXPRESSION), Some("0,2"));
    assert_eq!(records[0].attributes.expression().unwrap(), vec![0, 2]);
}

#[test]
fn multi_sample_file_keeps_its_columns() {
    let parsed = read_annotations(Cursor::new(TWO_SAMPLE_GFF)).unwrap();
    let table = merge_columns(&parsed.samples, parsed.records, &TracingObserver);
    assert_eq!(table.samples(), ["s1", "s2"]);
    assert_eq!(table.len(), 2);

    let canonical = IdentityKey::new("hsa-let-7a-1", 6, "iso-22-+Olk*WlT2");
    assert_eq!(table.count(&canonical, "s1"), 3);
    assert_eq!(table.count(&canonical, "s2"), 5);

    let mut out = Vec::new();
    table.write_tsv(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "chrom\tstart\tUID\tVariant\tCigar\ts1\ts2");
    assert!(lines[1].ends_with("\tNA\t22M\t3\t5"));
    assert!(lines[2].ends_with("\tiso_add:2\t22M2I\t0\t4"));
}

#[test]
fn multi_sample_file_absorbs_with_single_sample_tables() {
    let parsed = read_annotations(Cursor::new(TWO_SAMPLE_GFF)).unwrap();
    let mut table = merge(
        samples(vec![(
            "s3",
            vec![record("hsa-let-7a-1", 6, "iso-22-+Olk*WlT2", "NA", "2")],
        )]),
        &TracingObserver,
    );
    table.absorb(
        merge_columns(&parsed.samples, parsed.records, &TracingObserver),
        &TracingObserver,
    );

    let key = IdentityKey::new("hsa-let-7a-1", 6, "iso-22-+Olk*WlT2");
    assert_eq!(table.samples(), ["s3", "s1", "s2"]);
    let row = table.get(&key).unwrap();
    assert_eq!(table.row_counts(row), vec![2, 3, 5]);
}

#[test]
fn expression_width_must_match_columns() {
    let observer = Recorder::default();
    let columns = vec!["s1".to_string(), "s2".to_string()];
    let table = merge_columns(
        &columns,
        vec![
            record("hsa-let-7a-1", 6, "iso-22-A", "NA", "3"),
            record("hsa-let-7a-1", 6, "iso-22-B", "NA", "1,2"),
        ],
        &observer,
    );
    assert_eq!(table.len(), 1);
    assert_eq!(table.excluded(), 1);
    let excluded = observer.excluded.lock().unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].0, "s1,s2");
}
