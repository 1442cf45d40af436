use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::PathBuf,
};

use anyhow::anyhow;
use clap::Parser;
use log::{error, info, LevelFilter};
use rand::{rngs::StdRng, SeedableRng};
use simple_logger::SimpleLogger;
use statrs::statistics::Statistics;
use vicbf::{
    batch,
    filter::{
        empirical_fpr, growth, SerializedSize, VariableIncrementFilter, ZstdCompressor,
        DEFAULT_LEVEL,
    },
    rounds::{self, Preset, Statistic},
    utils::{time_it_once, ByteSize},
    FilterSpec, IterationLimit, Params, COMPRESSION_RATIO, DEFAULT_DEVIATION, DEFAULT_DIGIT_BASE,
    DEFAULT_TARGET,
};
use vicbf_params as vicbf;

// When built with musl, the allocator slows down a lot filter building
// so we have to use jemalloc to get back to the expected performance
#[cfg(all(target_env = "musl", target_pointer_width = "64"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Debug, Parser)]
pub struct Args {
    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
    /// The number of jobs used to run parameter searches. Set to 0 to take
    /// the optimal number of jobs (may be the amount of CPUs).
    #[clap(short, long, default_value = "0")]
    jobs: usize,
    /// Commands
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Searches filter parameters for the given numbers of entries
    Params(Search),
    /// Reads a round statistics file and writes the filter parameters
    /// needed by every round
    Batch(Batch),
    /// Builds real filters with the parameters found and compares them
    /// to the estimations
    Measure(Measure),
    /// Shows how the serialized size of a filter grows with insertions
    Growth(Growth),
}

#[derive(Debug, Parser)]
struct SearchOpts {
    /// Targeted false positive rate
    #[clap(short, long, default_value_t = DEFAULT_TARGET)]
    target: f64,
    /// Accepted absolute deviation around the target
    #[clap(short, long, default_value_t = DEFAULT_DEVIATION)]
    deviation: f64,
    /// Digit base (l) of the filter encoding
    #[clap(long, default_value_t = DEFAULT_DIGIT_BASE)]
    digit_base: f64,
    /// Maximum number of estimations done by a search. By default it
    /// grows with the number of entries.
    #[clap(long, conflicts_with = "unbounded")]
    max_iterations: Option<u64>,
    /// Runs searches until they converge, some may never end
    #[clap(long)]
    unbounded: bool,
}

impl SearchOpts {
    fn params(&self) -> Result<Params, anyhow::Error> {
        let limit = match (self.unbounded, self.max_iterations) {
            (true, _) => IterationLimit::Unbounded,
            (false, Some(max)) => IterationLimit::Fixed(max),
            (false, None) => IterationLimit::Auto,
        };

        let p = Params::new(self.target, self.deviation)
            .digit_base(self.digit_base)
            .limit(limit);
        p.validate()?;
        Ok(p)
    }
}

#[derive(Debug, Parser)]
struct Search {
    #[clap(flatten)]
    search: SearchOpts,
    /// Numbers of entries the filters must hold
    #[clap(required = true)]
    entries: Vec<i64>,
}

#[derive(Debug, Parser)]
struct Batch {
    /// Statistic to compute, formatted as NAME=EXPR where EXPR is a zero
    /// based column index or the difference of two columns (ex: r_med=26-31).
    /// Can be repeated, takes precedence over the preset.
    #[clap(long = "stat")]
    stats: Vec<Statistic>,
    /// Statistics to compute when none is given (retr-only or proto1)
    #[clap(short, long, default_value_t = Preset::RetrOnly)]
    preset: Preset,
    /// Fails when a round is omitted from the output
    #[clap(long)]
    strict: bool,
    #[clap(flatten)]
    search: SearchOpts,
    /// File containing round statistics
    input: PathBuf,
    /// Output file, the table is written to stdout if missing
    output: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct Measure {
    /// Compression level
    #[clap(long, default_value_t = DEFAULT_LEVEL)]
    level: i32,
    /// Number of absent keys queried per run
    #[clap(long, default_value_t = 100_000)]
    probes: u64,
    /// Number of runs to compute statistics
    #[clap(short, long, default_value_t = 5)]
    runs: u64,
    #[clap(flatten)]
    search: SearchOpts,
    /// Numbers of entries the filters must hold
    #[clap(required = true)]
    entries: Vec<i64>,
}

#[derive(Debug, Parser)]
struct Growth {
    /// Number of slots of the filter
    #[clap(short, long, default_value_t = 10_000)]
    slots: u64,
    /// Number of hash functions of the filter
    #[clap(short = 'k', long, default_value_t = 3)]
    hash_functions: u64,
    /// Number of entries to insert
    #[clap(short = 'n', long, default_value_t = 10_000)]
    entries: u64,
    /// Number of insertions between two measures
    #[clap(long, default_value_t = 10)]
    step: u64,
    /// Compression level
    #[clap(short, long, default_value_t = DEFAULT_LEVEL)]
    level: i32,
}

fn show_spec(s: &FilterSpec) {
    let size = s.size_estimate();
    println!("\tn (number of entries)                    : {}", s.entries);
    println!(
        "\tk (number of hash functions)             : {}",
        s.hash_functions
    );
    println!("\tm (number of slots)                      : {}", s.slots);
    println!("\tfpr (false positive rate)                : {}", s.fpr);
    println!(
        "\tsearch iterations                        : {}",
        s.iterations
    );
    println!(
        "\tSize of serialized filter                : {}",
        ByteSize::from(size.uncompressed)
    );
    println!(
        "\tSize of compressed filter (estimate)     : {}",
        ByteSize::from(size.compressed)
    );
}

fn filter_digit_base(l: f64) -> Result<u8, anyhow::Error> {
    if l.fract() != 0.0 || !(1.0..=127.0).contains(&l) {
        return Err(anyhow!(
            "filters can only be built with an integer digit base in [1, 127], got {l}"
        ));
    }
    Ok(l as u8)
}

fn build_filter(spec: &FilterSpec, digit_base: u8) -> Result<VariableIncrementFilter, vicbf::Error> {
    let mut f =
        VariableIncrementFilter::with_digit_base(spec.slots, spec.hash_functions, digit_base)?;
    for key in 0..spec.entries {
        f.insert(&key);
    }
    Ok(f)
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    SimpleLogger::new()
        .with_level(match args.verbose {
            true => LevelFilter::Debug,
            false => LevelFilter::Info,
        })
        .init()?;

    match args.command {
        Command::Params(o) => {
            let params = o.search.params()?;
            let searches = batch::search_distinct(o.entries, params, args.jobs)?;

            let mut failed = 0usize;
            for (n, r) in searches {
                match r {
                    Ok(spec) => {
                        println!("Entries: {n}");
                        show_spec(&spec);
                    }
                    Err(e) => {
                        error!("no parameters for {n} entries: {e}");
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                return Err(anyhow!("{failed} searches failed"));
            }
        }

        Command::Batch(o) => {
            let stats = match o.stats.is_empty() {
                true => o.preset.statistics(),
                false => o.stats,
            };
            let params = o.search.params()?;

            let input = BufReader::new(File::open(&o.input)?);
            let mut output: Box<dyn Write> = match o.output {
                Some(p) => Box::new(BufWriter::new(File::create(p)?)),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };

            let (summary, t) =
                time_it_once(|| rounds::scale(input, &mut output, &stats, params, args.jobs));
            let summary = summary?;
            output.flush()?;

            info!(
                "{} rounds written, {} omitted in {t:?}",
                summary.written, summary.omitted
            );

            if o.strict && summary.omitted > 0 {
                return Err(anyhow!("{} rounds have been omitted", summary.omitted));
            }
        }

        Command::Measure(o) => {
            let params = o.search.params()?;
            let digit_base = filter_digit_base(params.digit_base)?;

            for n in o.entries {
                let spec = params.find(n)?;
                let (f, t) = time_it_once(|| build_filter(&spec, digit_base));
                let f = f?;
                let size = SerializedSize::of(&f, &ZstdCompressor, o.level)?;

                // every run probes a different set of absent keys
                let fprs = (0..o.runs)
                    .map(|run| {
                        let mut rng = StdRng::seed_from_u64(run);
                        empirical_fpr(&f, spec.entries, o.probes, &mut rng).fp_rate()
                    })
                    .collect::<Vec<f64>>();

                println!("Entries: {n}");
                show_spec(&spec);
                println!("\nMeasured:");
                println!("\tbuild time                               : {t:?}");
                println!(
                    "\tSize of serialized filter                : {}",
                    ByteSize::from_bytes(size.uncompressed)
                );
                println!(
                    "\tSize of compressed filter                : {} (ratio={:.3} VS {COMPRESSION_RATIO})",
                    ByteSize::from_bytes(size.compressed),
                    size.ratio()
                );
                println!(
                    "\tsaturated counters                       : {}",
                    f.saturated()
                );
                println!(
                    "\tfp rate over {} runs                      : {:.6} (std dev={:.6})",
                    o.runs,
                    fprs.iter().mean(),
                    fprs.iter().std_dev()
                );
                println!();
            }
        }

        Command::Growth(o) => {
            let points = growth::<VariableIncrementFilter, _>(
                o.slots,
                o.hash_functions,
                o.entries,
                o.step,
                &ZstdCompressor,
                o.level,
            )?;

            println!("inserted len compressed fpr");
            for p in points {
                println!(
                    "{} {} {} {}",
                    p.inserted, p.size.uncompressed, p.size.compressed, p.fpr
                );
            }
        }
    }

    Ok(())
}
