use std::{
    io,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use enduro::{
    AnalysisConfig, DegradationModel, EnduroError, GapAligner, LapRange, RaceStats, RowStore,
    analysis::FeatureExtractor, compare_many, load_race_csv, writer,
};
use log::{error, info, warn};
use serde::Serialize;

/// Number of finishers used for feature extraction when no cars are given
const DEFAULT_FEATURE_CARS: usize = 10;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Analysis settings file, defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit tire degradation trends for each stint of one or more cars
    Degradation {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, required = true, num_args = 1..)]
        cars: Vec<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Gap between two cars over a lap range
    Gap {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        reference: String,

        #[arg(long)]
        other: String,

        #[arg(long)]
        from: u32,

        #[arg(long)]
        to: u32,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Gaps from one reference car to several others over a lap range
    Gaps {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        reference: String,

        #[arg(long, required = true, num_args = 1..)]
        others: Vec<String>,

        #[arg(long)]
        from: u32,

        #[arg(long)]
        to: u32,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Gap to an opponent at one lap, before and after an average-length stop
    PitGap {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        reference: String,

        #[arg(long)]
        opponent: String,

        #[arg(long)]
        lap: u32,

        /// Total time the reference car spent in the pit lane, in seconds
        #[arg(long)]
        total_pit_time: f64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Pit and pace summary for every finisher of a class
    Stats {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        class: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Per-row race-state features for a class
    Features {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        class: String,

        /// Cars to include, defaults to the top finishers of the class
        #[arg(long, num_args = 1..)]
        cars: Vec<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load(input: &Path) -> Result<RowStore, EnduroError> {
    let mut store = load_race_csv(input)?;
    let report = store.normalize();
    if !report.warnings.is_empty() {
        warn!(
            "{} time fields could not be parsed and were left out of the analysis",
            report.warnings.len()
        );
    }
    info!("Normalized {} time fields", report.normalized);
    Ok(store)
}

fn emit<T: Serialize>(output: Option<&Path>, results: &[T]) -> Result<(), EnduroError> {
    match output {
        Some(path) => {
            writer::write_results(path, results)?;
            info!("Wrote {} results to {:?}", results.len(), path);
            Ok(())
        }
        None => writer::print_results(&mut io::stdout().lock(), results),
    }
}

fn degradation(
    config: &AnalysisConfig,
    input: &Path,
    cars: &[String],
    output: Option<&Path>,
) -> Result<(), EnduroError> {
    let store = load(input)?;
    let model = DegradationModel::from_config(config);
    let reports = cars
        .iter()
        .filter_map(|car| match model.analyze(&store, car) {
            Ok(report) => {
                info!(
                    "Car #{}: {} stints, average degradation {:.3} s/h",
                    car,
                    report.trends.len(),
                    report.average_slope
                );
                Some(report)
            }
            Err(e) => {
                error!("Car #{}: {}", car, e);
                None
            }
        })
        .collect::<Vec<_>>();
    emit(output, &reports)
}

fn stats(input: &Path, class: &str, output: Option<&Path>) -> Result<(), EnduroError> {
    let store = load(input)?;
    let stats = RaceStats::new(&store);
    let summaries = stats
        .cars_that_finished(class)
        .iter()
        .filter_map(|car| {
            stats
                .car_summary(car)
                .map_err(|e| error!("Car #{}: {}", car, e))
                .ok()
        })
        .collect::<Vec<_>>();
    emit(output, &summaries)
}

fn features(
    config: &AnalysisConfig,
    input: &Path,
    class: &str,
    cars: &[String],
    output: Option<&Path>,
) -> Result<(), EnduroError> {
    let store = load(input)?;
    let cars = if cars.is_empty() {
        let mut finishers = RaceStats::new(&store).cars_that_finished(class);
        finishers.truncate(DEFAULT_FEATURE_CARS);
        finishers
    } else {
        cars.to_vec()
    };
    let rows = FeatureExtractor::from_config(config).extract(&store, class, &cars);
    emit(output, &rows)
}

fn run(args: Args) -> Result<(), EnduroError> {
    let config = AnalysisConfig::resolve(args.config.as_deref())?;
    match args.command {
        Commands::Degradation {
            input,
            cars,
            output,
        } => degradation(&config, &input, &cars, output.as_deref()),
        Commands::Gap {
            input,
            reference,
            other,
            from,
            to,
            output,
        } => {
            let store = load(&input)?;
            let analysis =
                GapAligner::new(&store).compare(&reference, &other, LapRange::new(from, to)?)?;
            emit(output.as_deref(), &[analysis])
        }
        Commands::Gaps {
            input,
            reference,
            others,
            from,
            to,
            output,
        } => {
            let store = load(&input)?;
            let analysis = compare_many(&store, &reference, &others, LapRange::new(from, to)?)?;
            emit(output.as_deref(), &[analysis])
        }
        Commands::PitGap {
            input,
            reference,
            opponent,
            lap,
            total_pit_time,
            output,
        } => {
            let store = load(&input)?;
            let projection = RaceStats::new(&store).gap_after_average_stop(
                &reference,
                &opponent,
                lap,
                total_pit_time,
            )?;
            info!(
                "Gap to #{} on lap {}: {:.3} s before pitting, {:.3} s after",
                opponent, lap, projection.gap_before_s, projection.gap_after_s
            );
            emit(output.as_deref(), &[projection])
        }
        Commands::Stats {
            input,
            class,
            output,
        } => stats(&input, &class, output.as_deref()),
        Commands::Features {
            input,
            class,
            cars,
            output,
        } => features(&config, &input, &class, &cars, output.as_deref()),
    }
}

fn main() {
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
