use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "isomir-rs",
    about = "Annotate miRNA isoforms against miRBase hairpins and merge samples",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Set logging level to WARN
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Annotate collapsed reads aligned to hairpins
    Annotate(AnnotateArgs),
    /// Merge annotation files of several samples into one count table
    Merge(MergeArgs),
    /// Check annotation files against the mirGFF3 format
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
pub struct AnnotateArgs {
    /// Hairpin sequences (FASTA)
    #[arg(long = "hairpin", value_name = "FASTA")]
    pub hairpin: PathBuf,

    /// miRBase annotation with mature arm coordinates (GFF3)
    #[arg(long = "gff", value_name = "GFF3")]
    pub gff: PathBuf,

    /// Keep only hairpins of this species (e.g. hsa)
    #[arg(long)]
    pub species: Option<String>,

    /// Reads aligned to the hairpins (SAM)
    #[arg(long = "sam", value_name = "SAM")]
    pub sam: PathBuf,

    /// Output annotation file
    #[arg(short = 'o', long = "out", value_name = "GFF")]
    pub out: PathBuf,

    /// Sample name for the COLDATA header (defaults to the SAM file stem)
    #[arg(long)]
    pub sample: Option<String>,

    /// Value of the source column (defaults to the miRBase release named in the GFF3 header)
    #[arg(long)]
    pub source: Option<String>,

    /// Number of threads (CPUs) to use
    #[arg(short = 'p', long = "threads", default_value_t = 1)]
    pub threads: u8,
}

#[derive(clap::Args, Debug)]
pub struct MergeArgs {
    /// Output count table (TSV)
    #[arg(short = 'o', long = "out", value_name = "TSV")]
    pub out: PathBuf,

    /// Annotation files, one or more samples each
    #[arg(required = true, value_name = "GFF")]
    pub inputs: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Annotation files to check
    #[arg(required = true, value_name = "GFF")]
    pub inputs: Vec<PathBuf>,
}
