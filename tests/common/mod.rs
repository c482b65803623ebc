#![allow(dead_code)]

use isomir_rs::reference::{Mature, Precursor, ReferenceDb};
use isomir_rs::{AnnotationRecord, Error, Observer, ReadObservation};
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// hsa-let-7a-1 stem-loop, DNA alphabet.
pub const HAIRPIN: &str =
    "TGGGATGAGGTAGTAGGTTGTATAGTTTTAGGGTCACACCCACCACTGGGAGATAACTATACAATCTACTGTCTTTCC";
pub const LET7A_5P: &str = "TGAGGTAGTAGGTTGTATAGTT";
pub const LET7A_3P: &str = "CTATACAATCTACTGTCTTTC";

pub const HAIRPIN_FA: &str = "\
>hsa-let-7a-1 MI0000060 Homo sapiens let-7a-1 stem-loop
UGGGAUGAGGUAGUAGGUUGUAUAGUUUUAGGGUCACACCCACC
ACUGGGAGAUAACUAUACAAUCUACUGUCUUUCC
>hsa-mir-rev MI9999999 Homo sapiens reverse-strand test stem-loop
UGGGAUGAGGUAGUAGGUUGUAUAGUUUUAGGGUCACACCCACCACUGGGAGAUAACUAUACAAUCUACUGUCUUUCC
>mmu-let-7a-1 MI0000556 Mus musculus let-7a-1 stem-loop
UGGGAUGAGGUAGUAGGUUGUAUAGUUUUAGGGUCACACCCACCACUGGGAGAUAACUAUACAAUCUACUGUCUUUCC
";

pub const GFF3: &str = "\
##gff-version 3
#
# Chromosomal coordinates of test microRNAs
# microRNAs:               miRBase v21
#
chr9\t.\tmiRNA_primary_transcript\t1000\t1077\t.\t+\t.\tID=MI0000060;Alias=MI0000060;Name=hsa-let-7a-1
chr9\t.\tmiRNA\t1005\t1026\t.\t+\t.\tID=MIMAT0000062;Alias=MIMAT0000062;Name=hsa-let-7a-5p;Derives_from=MI0000060
chr9\t.\tmiRNA\t1056\t1076\t.\t+\t.\tID=MIMAT0004481;Alias=MIMAT0004481;Name=hsa-let-7a-3p;Derives_from=MI0000060
chr1\t.\tmiRNA_primary_transcript\t2000\t2077\t.\t-\t.\tID=MI9999999;Alias=MI9999999;Name=hsa-mir-rev
chr1\t.\tmiRNA\t2051\t2072\t.\t-\t.\tID=MIMAT9999999;Alias=MIMAT9999999;Name=hsa-mir-rev-5p;Derives_from=MI9999999
chr13\t.\tmiRNA_primary_transcript\t500\t577\t.\t+\t.\tID=MI0000556;Alias=MI0000556;Name=mmu-let-7a-1
chr13\t.\tmiRNA\t505\t526\t.\t+\t.\tID=MIMAT0000521;Alias=MIMAT0000521;Name=mmu-let-7a-5p;Derives_from=MI0000556
";

/// Two-sample annotation file: let-7a-5p and a 2-base addition.
pub const TWO_SAMPLE_GFF: &str = "\
## mirGFF3. VERSION 1.0
## source-ontology: miRBasev21
## COLDATA: s1,s2
hsa-let-7a-1\tmiRBasev21\tref_miRNA\t6\t27\t.\t+\t.\tRead TGAGGTAGTAGGTTGTATAGTT; UID iso-22-+Olk*WlT2; Name hsa-let-7a-5p; Parent hsa-let-7a-1; Variant NA; Cigar 22M; Expression 3,5; Filter Pass; Hits 1;
hsa-let-7a-1\tmiRBasev21\tisomiR\t6\t29\t.\t+\t.\tRead TGAGGTAGTAGGTTGTATAGTTAA; UID iso-24-+Olk*WlT; Name hsa-let-7a-5p; Parent hsa-let-7a-1; Variant iso_add:2; Cigar 22M2I; Expression 0,4; Filter Pass; Hits 1;
";

/// Annotation file with one problem per record line.
pub const BROKEN_GFF: &str = "\
## mirGFF3. VERSION 1.0
## COLDATA: s1,s2
hsa-let-7a-1\tmiRBasev21\tmiRNA\t6\t27\t.\t+\t.\tRead TGAGGTAGTAGGTTGTATAGTT; UID iso-22-+Olk*WlT2; Variant NA; Cigar 22M; Expression 3,5;
hsa-let-7a-1\tmiRBasev21\tisomiR\t6\t27\t.\t+\t.\tRead TGAGGTAGTAGGTTGTATAGTT; UID iso-22-+Olk*WlT2; Variant NA; Expression 3,5;
hsa-let-7a-1\tmiRBasev21\tisomiR\t6\t27\t.\t+\t.\tRead TGAGGTAGTAGGTTGTATAGTT; UID iso-22-+Olk*WlT2; Variant NA; Cigar 22M; Expression 3;
hsa-let-7a-1\tmiRBasev21\tisomiR\t6\t27\t.\t+\t.\tRead TGAGGTAGTAGGTTGTATAGTA; UID iso-22-+Olk*WlT2; Variant iso_9p:1; Cigar 22M; Expression 3,5;
hsa-let-7a-1\tmiRBasev21\tisomiR\t6
";

pub fn temp_file(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

/// In-memory reference with both let-7a-1 arms.
pub fn reference() -> ReferenceDb {
    ReferenceDb::new(
        vec![Precursor::new("hsa-let-7a-1", HAIRPIN)],
        vec![
            Mature {
                name: "hsa-let-7a-5p".to_string(),
                precursor: "hsa-let-7a-1".to_string(),
                start: 5,
                end: 26,
            },
            Mature {
                name: "hsa-let-7a-3p".to_string(),
                precursor: "hsa-let-7a-1".to_string(),
                start: 56,
                end: 76,
            },
        ],
    )
    .expect("valid reference")
}

/// Observer that keeps every event for inspection.
#[derive(Debug, Default)]
pub struct Recorder {
    pub skipped: Mutex<Vec<(String, Error)>>,
    pub excluded: Mutex<Vec<(String, Error)>>,
    pub conflicts: Mutex<Vec<Error>>,
}

impl Observer for Recorder {
    fn read_skipped(&self, read: &ReadObservation, error: &Error) {
        self.skipped
            .lock()
            .unwrap()
            .push((read.sequence.clone(), error.clone()));
    }

    fn record_excluded(&self, sample: &str, _record: &AnnotationRecord, error: &Error) {
        self.excluded
            .lock()
            .unwrap()
            .push((sample.to_string(), error.clone()));
    }

    fn conflict(&self, error: &Error) {
        self.conflicts.lock().unwrap().push(error.clone());
    }
}
