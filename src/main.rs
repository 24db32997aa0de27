//! somreduce CLI - one-epoch SOM training
//!
//! Runs an epoch locally, or acts as a streaming mapper/reducer for an
//! external map/reduce engine.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use somreduce::storage::{
    decode_emission, encode_emission, encode_update, read_partitions, read_updates, write_updates,
};
use somreduce::{
    Accumulator, CounterMode, DegeneratePolicy, EpochConfig, EpochRunner, InstanceCounter,
    MapTask, NeuronGrid, ParsePolicy, Reducer, Result, SomError,
};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "somreduce")]
#[command(version)]
#[command(about = "One-epoch map/reduce Self-Organizing Map training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one epoch locally
    Run {
        /// Input records (file, or directory of partition files)
        input: PathBuf,

        /// Output directory (must not exist)
        output: PathBuf,

        /// Number of neurons
        neurons: usize,

        /// Number of attributes per vector
        attributes: usize,

        /// Initial neighborhood size (sigma0)
        neighborhood: f64,

        /// Neighborhood decay constant (lambda)
        decay: f64,

        /// Weight file for this epoch
        weights: PathBuf,

        /// Number of partitions when the input is a single file
        #[arg(short, long, default_value = "4")]
        partitions: usize,

        /// Skip malformed records instead of failing
        #[arg(long)]
        skip_malformed: bool,

        /// Output for neurons with zero total activation
        #[arg(long, value_enum, default_value = "retain")]
        degenerate: DegenerateArg,

        /// Instance counter sharing between partitions
        #[arg(long, value_enum, default_value = "partition")]
        counter: CounterArg,

        /// Counter value of the first record; advance it between epochs to keep annealing
        #[arg(long, default_value = "0")]
        baseline: u64,

        /// Pre-aggregate contributions inside each map task
        #[arg(long)]
        combine: bool,

        /// Also write the next epoch's weight file here
        #[arg(long)]
        next_grid: Option<PathBuf>,
    },

    /// Streaming mapper: records on stdin, emissions on stdout
    Map {
        /// Number of neurons
        neurons: usize,

        /// Number of attributes per vector
        attributes: usize,

        /// Initial neighborhood size (sigma0)
        neighborhood: f64,

        /// Neighborhood decay constant (lambda)
        decay: f64,

        /// Weight file for this epoch
        weights: PathBuf,

        /// Skip malformed records instead of failing
        #[arg(long)]
        skip_malformed: bool,

        /// Counter value of the first record; advance it between epochs to keep annealing
        #[arg(long, default_value = "0")]
        baseline: u64,
    },

    /// Streaming reducer: emissions on stdin, updated weights on stdout
    Reduce {
        /// Number of neurons
        neurons: usize,

        /// Number of attributes per vector
        attributes: usize,

        /// Weight file for this epoch
        weights: PathBuf,

        /// Output for neurons with zero total activation
        #[arg(long, value_enum, default_value = "retain")]
        degenerate: DegenerateArg,

        /// Emit a record for every neuron, not only those seen on stdin
        #[arg(long)]
        all_neurons: bool,
    },

    /// Build the next epoch's weight file from reduce output
    Assemble {
        /// Weight file of the finished epoch
        weights: PathBuf,

        /// Reduce output (part file or directory)
        updates: PathBuf,

        /// Next weight file
        output: PathBuf,

        /// Number of neurons
        #[arg(short, long)]
        neurons: usize,

        /// Number of attributes per vector
        #[arg(short, long)]
        attributes: usize,
    },

    /// Write a random initial weight file
    Init {
        /// Output weight file
        output: PathBuf,

        /// Number of neurons
        #[arg(short, long)]
        neurons: usize,

        /// Number of attributes per vector
        #[arg(short, long)]
        attributes: usize,

        /// Random seed for reproducibility
        #[arg(short, long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DegenerateArg {
    Retain,
    Inactive,
    Fail,
}

impl From<DegenerateArg> for DegeneratePolicy {
    fn from(arg: DegenerateArg) -> Self {
        match arg {
            DegenerateArg::Retain => DegeneratePolicy::RetainPrevious,
            DegenerateArg::Inactive => DegeneratePolicy::MarkInactive,
            DegenerateArg::Fail => DegeneratePolicy::Fail,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CounterArg {
    Partition,
    Global,
}

impl From<CounterArg> for CounterMode {
    fn from(arg: CounterArg) -> Self {
        match arg {
            CounterArg::Partition => CounterMode::PerPartition,
            CounterArg::Global => CounterMode::Global,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            neurons,
            attributes,
            neighborhood,
            decay,
            weights,
            partitions,
            skip_malformed,
            degenerate,
            counter,
            baseline,
            combine,
            next_grid,
        } => {
            let mut config = EpochConfig::new(neurons, attributes, neighborhood, decay, weights);
            config.parse_policy = parse_policy(skip_malformed);
            config.degenerate_policy = degenerate.into();
            config.counter_mode = counter.into();
            config.counter_baseline = baseline;
            run_epoch(config, input, output, partitions, combine, next_grid)
        }

        Commands::Map {
            neurons,
            attributes,
            neighborhood,
            decay,
            weights,
            skip_malformed,
            baseline,
        } => {
            let mut config = EpochConfig::new(neurons, attributes, neighborhood, decay, weights);
            config.parse_policy = parse_policy(skip_malformed);
            config.counter_baseline = baseline;
            stream_map(config)
        }

        Commands::Reduce {
            neurons,
            attributes,
            weights,
            degenerate,
            all_neurons,
        } => stream_reduce(neurons, attributes, weights, degenerate.into(), all_neurons),

        Commands::Assemble {
            weights,
            updates,
            output,
            neurons,
            attributes,
        } => assemble(weights, updates, output, neurons, attributes),

        Commands::Init {
            output,
            neurons,
            attributes,
            seed,
        } => init_weights(output, neurons, attributes, seed),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_policy(skip_malformed: bool) -> ParsePolicy {
    if skip_malformed {
        ParsePolicy::Skip
    } else {
        ParsePolicy::FailFast
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn run_epoch(
    config: EpochConfig,
    input: PathBuf,
    output: PathBuf,
    partitions: usize,
    combine: bool,
    next_grid: Option<PathBuf>,
) -> Result<()> {
    let start_time = Instant::now();

    // Configuration problems surface before any record is read.
    let grid = config.load_grid()?;
    if output.exists() {
        return Err(SomError::Config(format!(
            "output directory {} already exists",
            output.display()
        )));
    }
    println!(
        "✓ Loaded {} neurons x {} attributes from {}",
        grid.neuron_count(),
        grid.dimension(),
        config.weights_path.display()
    );

    let pb = spinner("Reading input records...");
    let partitions = read_partitions(&input, partitions)?;
    pb.finish_and_clear();
    let records: usize = partitions.iter().map(|p| p.len()).sum();
    println!("✓ Read {} records in {} partitions", records, partitions.len());

    let pb = spinner("Running epoch...");
    let mut runner = EpochRunner::new(&config, &grid)?.with_combiner(combine);
    let epoch = runner.run(&partitions);
    pb.finish_and_clear();
    let epoch = epoch?;

    let degenerate = epoch.degenerate();
    println!(
        "✓ Mapped {} vectors ({} skipped), {} neurons updated",
        epoch.instances(),
        epoch.stats.skipped,
        epoch.updates.len() - degenerate.len()
    );
    if !degenerate.is_empty() {
        println!("! {} neurons received zero activation", degenerate.len());
    }

    let part = write_updates(&output, &epoch.updates)?;
    println!("✓ Wrote {}", part.display());

    if let Some(path) = next_grid {
        epoch.next_grid(&grid)?.save(&path)?;
        println!("✓ Wrote next weights to {}", path.display());
    }

    info!("Epoch finished in {:.2?}", start_time.elapsed());
    Ok(())
}

fn stream_map(config: EpochConfig) -> Result<()> {
    let grid = config.load_grid()?;
    let mut task = MapTask::new(&grid, &config, InstanceCounter::local(config.counter_baseline))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_error: Option<io::Error> = None;

    for line in stdin.lock().lines() {
        let line = line?;
        task.map_record(&line, |j, c| {
            if write_error.is_none() {
                if let Err(e) = writeln!(out, "{}", encode_emission(j, &c)) {
                    write_error = Some(e);
                }
            }
        })?;
        if let Some(e) = write_error.take() {
            return Err(e.into());
        }
    }
    out.flush()?;

    let stats = task.stats();
    info!(
        "Mapped {} records ({} skipped), counter at {}",
        stats.mapped,
        stats.skipped,
        task.counter().value()
    );
    Ok(())
}

fn stream_reduce(
    neurons: usize,
    attributes: usize,
    weights: PathBuf,
    policy: DegeneratePolicy,
    all_neurons: bool,
) -> Result<()> {
    let grid = NeuronGrid::load(&weights, neurons, attributes)?;
    let reducer = Reducer::new(&grid, policy);

    // Sums are order-independent, so input need not be sorted by key.
    let mut accs: Vec<Accumulator> = vec![reducer.accumulator(); neurons];
    let mut seen = vec![false; neurons];

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (j, contribution) = decode_emission(&line)?;
        let acc = accs.get_mut(j).ok_or(SomError::NeuronOutOfBounds {
            index: j,
            max: neurons,
        })?;
        acc.add(&contribution)?;
        seen[j] = true;
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (j, acc) in accs.iter().enumerate() {
        if !(all_neurons || seen[j]) {
            continue;
        }
        let update = reducer.finish(j, acc)?;
        writeln!(out, "{}", encode_update(&update))?;
    }
    out.flush()?;
    Ok(())
}

fn assemble(
    weights: PathBuf,
    updates: PathBuf,
    output: PathBuf,
    neurons: usize,
    attributes: usize,
) -> Result<()> {
    let grid = NeuronGrid::load(&weights, neurons, attributes)?;
    let updates = read_updates(&updates)?;
    let inactive = updates.iter().filter(|u| u.weights().is_none()).count();

    let next = grid.apply_updates(&updates)?;
    next.save(&output)?;

    println!(
        "✓ Assembled {} neurons ({} records, {} inactive) into {}",
        next.neuron_count(),
        updates.len(),
        inactive,
        output.display()
    );
    Ok(())
}

fn init_weights(output: PathBuf, neurons: usize, attributes: usize, seed: Option<u64>) -> Result<()> {
    let grid = NeuronGrid::random(neurons, attributes, seed)?;
    save_grid(&grid, &output)?;
    println!("✓ Wrote {} x {} initial weights to {}", neurons, attributes, output.display());
    Ok(())
}

fn save_grid(grid: &NeuronGrid, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    grid.save(path)
}
