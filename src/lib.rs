//! isomir-rs: classify small-RNA reads as canonical miRNAs or isomiRs.
//!
//! # Library usage
//!
//! ```no_run
//! use isomir_rs::reference::ReferenceDb;
//! use isomir_rs::{AnnotateConfig, Annotator, TracingObserver, pipeline, sam_input};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let reference =
//!     ReferenceDb::from_files(Path::new("hairpin.fa"), Path::new("hsa.gff3"), Some("hsa"))?;
//! let annotator = Annotator::new(&reference, AnnotateConfig::default());
//!
//! let reads = sam_input::read_sam(Path::new("sample.sam"))?;
//! let (records, stats) = pipeline::run(&reads, &annotator, &TracingObserver, 4)?;
//! println!("{} records, {} skipped", records.len(), stats.skipped);
//! # Ok(())
//! # }
//! ```

pub(crate) mod types;

pub mod annotate;
pub mod annotation;
pub mod cigar;
pub mod codec;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod reference;
pub mod sam_input;
pub mod sequence;
pub mod sw;
pub mod variant;

mod api;

// Flat re-exports for the most commonly used public types.
pub use annotate::{AnnotateConfig, Annotator, Observer, TracingObserver};
pub use annotation::{AnnotationRecord, Attributes};
pub use api::{Counts, Placement, ReadObservation};
pub use cigar::{Cigar, CigarOp};
pub use error::{Error, Result};
pub use merge::{IdentityKey, MergeTable, merge};
pub use types::Strand;
pub use variant::VariantSignature;
