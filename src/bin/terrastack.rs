//! terrastack CLI - cloud masking, scene ranking and compositing

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use terrastack::core::{
    band_histograms, fold_cloud_into_alpha, BandHistogram, CloudClassifier, CompositePolicy,
    Compositor, RankingReport, SceneRanker,
};
use terrastack::io::{prepare_output_dir, RasterReader, RasterWriter};
use terrastack::{Collection, PipelineConfig};

#[derive(Parser)]
#[command(name = "terrastack")]
#[command(author, version, about = "Per-pixel compositing of multispectral scene stacks", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON pipeline configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mask clouds, rank scenes and write one composite per policy
    Composite {
        /// Directory of co-registered scenes
        input: PathBuf,
        /// Output directory (must not exist)
        output: PathBuf,
        /// Policies to produce, e.g. mean,median,greenest85 (overrides config)
        #[arg(short, long, value_delimiter = ',')]
        policies: Vec<String>,
        /// Skip the band histogram report
        #[arg(long)]
        no_histogram: bool,
    },
    /// Print greenest / snowiest / cloudiest / brightest scene rankings
    Rank {
        /// Directory of co-registered scenes
        input: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write each scene with its cloud mask folded into the alpha band
    Mask {
        /// Directory of co-registered scenes
        input: PathBuf,
        /// Output directory (must not exist)
        output: PathBuf,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path).context("Failed to load configuration"),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_collection(input: &Path) -> Result<Collection> {
    RasterReader::load_collection(input)
        .with_context(|| format!("Failed to load scenes from {}", input.display()))
}

fn print_histograms(histograms: &[BandHistogram]) {
    println!("Band histograms over valid pixels:");
    for h in histograms {
        match (h.range, h.mean, h.mode_bin(), h.bin_width()) {
            (Some((min, max)), Some(mean), Some((bin, count)), Some(width)) => {
                let mode_start = min as f64 + bin as f64 * width;
                println!(
                    "  {:<6} n={:<10} min={:<8} max={:<8} mean={:<10.1} mode=[{:.0}, {:.0}) x{}",
                    h.band.to_string(),
                    h.count,
                    min,
                    max,
                    mean,
                    mode_start,
                    mode_start + width,
                    count
                );
            }
            _ => println!("  {:<6} no valid pixels", h.band.to_string()),
        }
    }
}

fn print_rankings(report: &RankingReport) {
    for (title, ranking) in report.entries() {
        match ranking.best() {
            Some(best) => {
                println!("{} Scene: {}", title, best.label);
                println!("     {}: {:.6}", ranking.metric, best.score);
            }
            None => println!("{} Scene: none (no scene has valid pixels)", title),
        }
        for label in &ranking.unscored {
            println!("     skipped {}: no valid pixels", label);
        }
    }
}

fn parse_policies(names: &[String]) -> Result<Vec<CompositePolicy>> {
    names
        .iter()
        .map(|name| {
            name.parse::<CompositePolicy>()
                .with_context(|| format!("Invalid policy '{}'", name))
        })
        .collect()
}

fn run_composite(
    config: PipelineConfig,
    input: &Path,
    output: &Path,
    policies: &[String],
    no_histogram: bool,
) -> Result<()> {
    let policies = if policies.is_empty() {
        config.policies.clone()
    } else {
        parse_policies(policies)?
    };
    CompositePolicy::validate_batch(&policies).context("Invalid policy selection")?;

    // Fail before any work if the destination is taken
    if output.exists() {
        anyhow::bail!("Composites already exist at {}", output.display());
    }

    let collection = load_collection(input)?;

    if !no_histogram {
        let histograms = band_histograms(&collection, &config.histogram)?;
        print_histograms(&histograms);
    }

    let classifier = CloudClassifier::new(config.cloud.clone());
    let collection = classifier.classify_collection(collection)?;

    print_rankings(&SceneRanker::report(&collection));

    prepare_output_dir(output).context("Failed to create output directory")?;

    let compositor = Compositor::new(config.composite.clone());
    let writer = RasterWriter::new(config.composite.nodata);
    for policy in policies {
        let start = Instant::now();
        let composite = compositor.composite(policy, &collection)?;
        let path = output.join(policy.file_name());
        writer
            .write_composite(&composite, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} saved to: {} ({:.2?})", policy, path.display(), start.elapsed());
    }

    Ok(())
}

fn run_mask(config: PipelineConfig, input: &Path, output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!("Cloud masked data already exists at {}", output.display());
    }

    let collection = load_collection(input)?;
    let classifier = CloudClassifier::new(config.cloud);
    let collection = classifier.classify_collection(collection)?;

    prepare_output_dir(output).context("Failed to create output directory")?;

    let writer = RasterWriter::new(config.composite.nodata);
    for stack in collection.iter() {
        let folded = fold_cloud_into_alpha(stack)?;
        let path = output.join(stack.label());
        writer
            .write_stack(&folded, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    println!("Wrote {} masked scenes to {}", collection.len(), output.display());
    Ok(())
}

fn run_rank(config: PipelineConfig, input: &Path, json: bool) -> Result<()> {
    let collection = load_collection(input)?;
    let classifier = CloudClassifier::new(config.cloud);
    let collection = classifier.classify_collection(collection)?;
    let report = SceneRanker::report(&collection);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_rankings(&report);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Composite {
            input,
            output,
            policies,
            no_histogram,
        } => run_composite(config, &input, &output, &policies, no_histogram),
        Commands::Rank { input, json } => run_rank(config, &input, json),
        Commands::Mask { input, output } => run_mask(config, &input, &output),
    }
}
