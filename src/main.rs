mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{AnnotateArgs, Command, MergeArgs, ValidateArgs};
use isomir_rs::annotation;
use isomir_rs::merge::{self, MergeTable};
use isomir_rs::reference::{ReferenceDb, guess_database};
use isomir_rs::{AnnotateConfig, Annotator, TracingObserver, pipeline, sam_input};
use mimalloc::MiMalloc;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Annotate(args) => annotate(&args),
        Command::Merge(args) => merge_files(&args),
        Command::Validate(args) => validate_files(&args),
    }
}

fn annotate(args: &AnnotateArgs) -> Result<()> {
    let reference = ReferenceDb::from_files(&args.hairpin, &args.gff, args.species.as_deref())?;
    let reads = sam_input::read_sam(&args.sam)?;

    let sample = args.sample.clone().unwrap_or_else(|| file_stem(&args.sam));
    let source = match &args.source {
        Some(source) => source.clone(),
        None => guess_database(&args.gff).unwrap_or_else(|e| {
            tracing::warn!("{e}; using source label miRBase");
            "miRBase".to_string()
        }),
    };
    let config = AnnotateConfig {
        source,
        samples: vec![sample],
        ..AnnotateConfig::default()
    };
    let annotator = Annotator::new(&reference, config);
    let (records, stats) = pipeline::run(
        &reads,
        &annotator,
        &TracingObserver,
        args.threads.max(1) as usize,
    )?;

    let out = File::create(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let mut writer = BufWriter::new(out);
    let config = annotator.config();
    annotation::write_annotations(&mut writer, &config.source, &config.samples, &records)?;
    writer.flush()?;

    tracing::info!(
        total_reads = stats.total_reads,
        annotated = stats.annotated,
        canonical = stats.canonical,
        skipped = stats.skipped,
        "isomir-rs: annotation complete"
    );
    Ok(())
}

fn merge_files(args: &MergeArgs) -> Result<()> {
    let observer = TracingObserver;
    let mut table = MergeTable::new();

    for path in &args.inputs {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let parsed = annotation::read_annotations(BufReader::new(file))
            .with_context(|| format!("failed to read {}", path.display()))?;
        for (line, error) in &parsed.rejected {
            tracing::warn!("{}:{line}: {error}", path.display());
        }

        let partial = if parsed.samples.is_empty() {
            merge::merge([(file_stem(path), parsed.records)], &observer)
        } else {
            merge::merge_columns(&parsed.samples, parsed.records, &observer)
        };
        table.absorb(partial, &observer);
    }

    let out = File::create(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let mut writer = BufWriter::new(out);
    table.write_tsv(&mut writer)?;
    writer.flush()?;

    tracing::info!(
        samples = table.samples().len(),
        rows = table.len(),
        conflicts = table.conflicts().len(),
        excluded = table.excluded(),
        "isomir-rs: merge complete"
    );
    Ok(())
}

fn validate_files(args: &ValidateArgs) -> Result<()> {
    let mut failed = 0usize;
    for path in &args.inputs {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let report = annotation::validate(BufReader::new(file))
            .with_context(|| format!("failed to read {}", path.display()))?;
        for (line, problem) in &report.problems {
            tracing::warn!("{}:{line}: {problem}", path.display());
        }
        tracing::info!(
            records = report.records,
            samples = report.samples.len(),
            problems = report.problems.len(),
            "checked {}",
            path.display()
        );
        if !report.is_valid() {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} files are not valid mirGFF3", args.inputs.len());
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string())
}
