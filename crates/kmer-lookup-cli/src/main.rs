use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kmer_lookup::database::read_kmer_dump;
use kmer_lookup::encoding::decode_kmer;
use kmer_lookup::{
    ExactLookup, LookupBuilder, LookupConfig, MemoryDatabase, SequenceLookupSummary, SequenceQuery,
};
use needletail::parser::{write_fasta, LineEnding};
use needletail::parse_fastx_file;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::info;

#[derive(Parser)]
#[command(name = "kmer-lookup")]
#[command(version = "0.1.0")]
#[command(about = "Exact k-mer lookups of sequences against a k-mer database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options describing the k-mer table to build
#[derive(Args, Clone)]
struct TableArgs {
    /// K-mer database as a text dump (KMER VALUE per line)
    #[arg(short, long)]
    database: String,

    /// Split the database into 2^FILE_BITS files for parallel loading
    #[arg(long, default_value = "6")]
    file_bits: usize,

    /// Ignore k-mers with value below this
    #[arg(long, default_value = "1")]
    min: u64,

    /// Ignore k-mers with value above this (default: database maximum)
    #[arg(long)]
    max: Option<u64>,

    /// Memory ceiling in GiB
    #[arg(short = 'm', long, default_value = "16")]
    memory: f64,

    /// Force the prefix width instead of estimating it
    #[arg(long)]
    prefix_bits: Option<usize>,

    /// Only record k-mer presence, not values
    #[arg(long)]
    existence_only: bool,

    /// Number of threads (0 = all available cores)
    #[arg(short = 't', long, default_value = "0")]
    threads: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl TableArgs {
    fn config(&self) -> anyhow::Result<LookupConfig> {
        let config = LookupConfig {
            max_memory_gib: self.memory,
            prefix_bits: self.prefix_bits,
            min_value: self.min,
            max_value: self.max,
            store_values: !self.existence_only,
            num_threads: self.threads,
            verbose: self.verbose,
            ..LookupConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn read_database(&self) -> anyhow::Result<MemoryDatabase> {
        read_kmer_dump(&self.database, self.file_bits)
            .with_context(|| format!("failed to read k-mer database {}", self.database))
    }

    fn load(&self) -> anyhow::Result<ExactLookup> {
        let config = self.config()?;
        let db = self.read_database()?;
        let lookup = ExactLookup::load(&db, &config)?;
        if self.verbose {
            lookup.print_space_breakdown();
        }
        Ok(lookup)
    }
}

/// Options describing the sequences to query
#[derive(Args, Clone)]
struct QueryArgs {
    /// Query sequences (FASTA/FASTQ, optionally gzipped)
    #[arg(short, long)]
    sequence: String,

    /// Look up k-mers as read instead of in canonical form
    #[arg(long)]
    forward_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report how many k-mers of each sequence are in the database
    Existence {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Report every k-mer of every sequence with its database value
    Dump {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Write sequences sharing at least one k-mer with the database
    Include {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        query: QueryArgs,
        /// Output FASTA file
        #[arg(short, long)]
        output: String,
    },

    /// Write sequences sharing no k-mer with the database
    Exclude {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        query: QueryArgs,
        /// Output FASTA file
        #[arg(short, long)]
        output: String,
    },

    /// Print the memory estimate for each prefix width without building
    Estimate {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Build a table and verify every database k-mer is found
    Check {
        #[command(flatten)]
        table: TableArgs,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Existence { table, query } => existence_command(&table, &query)?,
        Commands::Dump { table, query } => dump_command(&table, &query)?,
        Commands::Include {
            table,
            query,
            output,
        } => filter_command(&table, &query, &output, true)?,
        Commands::Exclude {
            table,
            query,
            output,
        } => filter_command(&table, &query, &output, false)?,
        Commands::Estimate { table } => estimate_command(&table)?,
        Commands::Check { table } => check_command(&table)?,
    }

    Ok(())
}

/// First word of a record header
fn record_name(id: &[u8]) -> String {
    let id = String::from_utf8_lossy(id);
    id.split_whitespace().next().unwrap_or_default().to_string()
}

/// Call `visit(id, seq)` for every record of a FASTA/FASTQ file
fn for_each_record<F>(path: &str, mut visit: F) -> anyhow::Result<()>
where
    F: FnMut(&[u8], &[u8]) -> anyhow::Result<()>,
{
    let mut reader =
        parse_fastx_file(path).with_context(|| format!("failed to open sequences {path}"))?;
    while let Some(record) = reader.next() {
        let record = record.with_context(|| format!("failed to parse a record of {path}"))?;
        let seq = record.seq();
        visit(record.id(), &seq)?;
    }
    Ok(())
}

/// Per-sequence k-mer counts: `name  kmers  found`
fn existence_command(table: &TableArgs, query: &QueryArgs) -> anyhow::Result<()> {
    let lookup = table.load()?;
    let engine = SequenceQuery::new(&lookup, !query.forward_only);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut total = SequenceLookupSummary::default();
    let mut num_sequences = 0u64;

    for_each_record(&query.sequence, |id, seq| {
        let summary = engine.summarize(seq);
        writeln!(
            out,
            "{}\t{}\t{}",
            record_name(id),
            summary.num_kmers,
            summary.num_found
        )?;
        total.merge(&summary);
        num_sequences += 1;
        Ok(())
    })?;
    out.flush()?;

    info!(
        "{} sequences: {} of {} k-mers found",
        num_sequences, total.num_found, total.num_kmers
    );
    Ok(())
}

/// Per-k-mer report: `name  pos  kmer  value`
fn dump_command(table: &TableArgs, query: &QueryArgs) -> anyhow::Result<()> {
    let lookup = table.load()?;
    let k = lookup.k();
    let engine = SequenceQuery::new(&lookup, !query.forward_only);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for_each_record(&query.sequence, |id, seq| {
        let name = record_name(id);
        for hit in engine.hits(seq) {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                name,
                hit.pos,
                decode_kmer(hit.key, k),
                hit.value.unwrap_or(0)
            )?;
        }
        Ok(())
    })?;
    out.flush()?;
    Ok(())
}

/// Copy sequences that do (`include`) or do not share a k-mer with the table
fn filter_command(
    table: &TableArgs,
    query: &QueryArgs,
    output: &str,
    include: bool,
) -> anyhow::Result<()> {
    let lookup = table.load()?;
    let engine = SequenceQuery::new(&lookup, !query.forward_only);

    let file = File::create(output).with_context(|| format!("failed to create {output}"))?;
    let mut out = BufWriter::new(file);
    let (mut kept, mut seen) = (0u64, 0u64);

    for_each_record(&query.sequence, |id, seq| {
        seen += 1;
        if engine.any_found(seq) == include {
            write_fasta(id, seq, &mut out, LineEnding::Unix)?;
            kept += 1;
        }
        Ok(())
    })?;
    out.flush()?;

    info!(
        "Wrote {} of {} sequences to {} ({})",
        kept,
        seen,
        output,
        if include { "include" } else { "exclude" }
    );
    Ok(())
}

/// Print the space estimator table for a database
fn estimate_command(table: &TableArgs) -> anyhow::Result<()> {
    let config = table.config()?;
    let db = table.read_database()?;

    let mut builder = LookupBuilder::new(&db, config)?;
    builder.initialize()?;
    if let Some(estimate) = builder.estimate() {
        estimate.print_table();
        println!(
            "prefix_bits={} memory_gib={:.4} limit_gib={:.4}",
            estimate.prefix_bits(),
            estimate.best().total_gib(),
            estimate.max_memory_gib
        );
    }
    Ok(())
}

/// Verify every database k-mer is found with its value
fn check_command(table: &TableArgs) -> anyhow::Result<()> {
    let db = table.read_database()?;
    let config = table.config()?;
    let lookup = ExactLookup::load(&db, &config)?;

    let min_value = lookup.min_value();
    let max_value = lookup.max_value();
    let (mut checked, mut errors) = (0u64, 0u64);

    for (key, value) in db.iter() {
        let kept = (min_value..=max_value).contains(&value);
        let expected = match (kept, lookup.has_values()) {
            (false, _) => None,
            (true, true) => Some(value),
            (true, false) => Some(1),
        };
        let found = lookup.exists_with_value(key);
        if found != expected {
            errors += 1;
            if errors <= 10 {
                tracing::warn!(
                    "{}: expected {:?}, found {:?}",
                    decode_kmer(key, lookup.k()),
                    expected,
                    found
                );
            }
        }
        checked += 1;
    }

    println!("Checked {} k-mers: {} errors", checked, errors);
    if errors > 0 {
        anyhow::bail!("{} of {} k-mers were not found as expected", errors, checked);
    }
    info!("EVERYTHING OK!");
    Ok(())
}
