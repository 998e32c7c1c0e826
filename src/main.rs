use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use starlabel::{
    CompileConfig, DataRoot, DatasetCompiler, DatasetLoader, LabelStats, LoadSelection, Sources,
    Target,
};

#[derive(Parser)]
#[command(name = "starlabel", about = "Compile and inspect stellar spectra training sets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a dataset from the survey data tree described by a JSON config.
    Compile {
        /// Path to the compile configuration (JSON).
        config: PathBuf,

        /// Override the output dataset name.
        #[arg(long)]
        output: Option<String>,

        /// Override the data root.
        #[arg(long)]
        data_root: Option<PathBuf>,
    },

    /// Load a compiled dataset and summarize the selected labels.
    Inspect {
        /// Dataset name, with or without extension.
        name: String,

        /// Directory holding the dataset.
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Label column(s) to load; `all` for the training set. Can be repeated.
        #[arg(short, long, default_value = "all")]
        target: Vec<String>,

        /// Load individual visits instead of combined spectra.
        #[arg(long)]
        visits: bool,

        /// Drop rows where any target is missing.
        #[arg(long)]
        exclude_sentinel: bool,

        /// Write per-target mean and std as JSON.
        #[arg(long)]
        stats_out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Commands::Compile {
            config,
            output,
            data_root,
        } => run_compile(config, output, data_root),
        Commands::Inspect {
            name,
            dir,
            target,
            visits,
            exclude_sentinel,
            stats_out,
        } => run_inspect(name, dir, target, visits, exclude_sentinel, stats_out),
    }
}

fn run_compile(
    config_path: PathBuf,
    output: Option<String>,
    data_root: Option<PathBuf>,
) -> Result<()> {
    let mut config = CompileConfig::from_json_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(output) = output {
        config.output = output;
    }
    if let Some(root) = data_root {
        config.data_root = root;
    }

    let root = DataRoot::new(&config.data_root, config.gaia_dr);
    let compiler = DatasetCompiler::new(config).context("invalid compile configuration")?;
    let report = compiler
        .compile(Sources::from_one(&root))
        .context("compilation failed")?;

    println!("Dataset:        {}", report.path.display());
    println!("Accepted stars: {}", report.accepted_stars);
    println!("Rows:           {}", report.rows);
    println!("Matched rows:   {}", report.matched_rows);
    Ok(())
}

fn run_inspect(
    name: String,
    dir: PathBuf,
    target: Vec<String>,
    visits: bool,
    exclude_sentinel: bool,
    stats_out: Option<PathBuf>,
) -> Result<()> {
    let target = match target.as_slice() {
        [one] => Target::Keyword(one.clone()),
        _ => Target::Fields(target),
    };
    let names = target.resolve();
    let loader = DatasetLoader::new(dir, name).with_selection(LoadSelection {
        target,
        load_combined: !visits,
        exclude_sentinel,
    });
    let path = loader.resolve_path()?;
    let (spectra, labels) = loader
        .load()
        .with_context(|| format!("loading {}", path.display()))?;

    println!("Dataset: {}", path.display());
    println!("Spectra: {} x {}", spectra.nrows(), spectra.ncols());
    println!("Labels:  {} x {}", labels.nrows(), labels.ncols());

    let stats = LabelStats::from_labels(names, &labels)?;
    println!("{:<10} {:>14} {:>14}", "target", "mean", "std");
    for ((n, m), s) in stats.names.iter().zip(&stats.mean).zip(&stats.std) {
        println!("{n:<10} {m:>14.4} {s:>14.4}");
    }

    if let Some(out) = stats_out {
        stats
            .save(&out)
            .with_context(|| format!("writing {}", out.display()))?;
        log::info!("saved label statistics to {}", out.display());
    }
    Ok(())
}
