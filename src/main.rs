use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use facesort::selector::{self, Task};
use facesort::{config, extract, filter, training, Context};
use log::info;

#[derive(Parser)]
#[command(name = "facesort")]
#[command(
    version,
    about = "Sort family photos by the faces in them"
)]
struct Cli {
    /// Config file (defaults to facesort.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Downsize every person's photos and save the detected faces
    Extract,
    /// Train the recognizer from the saved faces and write the model
    Train,
    /// Sort a folder of photos into buckets
    Filter {
        /// Folder to sort (asked for when missing)
        #[arg(short, long)]
        src: Option<PathBuf>,
        /// Where the buckets are created (asked for when missing)
        #[arg(short, long)]
        dst: Option<PathBuf>,
    },
    /// Write the effective config file so it can be edited
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg_path = cli.config.as_deref();
    let cfg = config::load_config(cfg_path)?;

    match cli.command {
        Some(Commands::Extract) => run_extract(cfg),
        Some(Commands::Train) => run_training(cfg),
        Some(Commands::Filter { src, dst }) => run_filter(cfg, src, dst),
        Some(Commands::Config) => write_config(&cfg, cfg_path),
        None => {
            let task = selector::choose_task(&mut io::stdin().lock(), &mut io::stdout())?;
            match task {
                Task::ExtractFaces => run_extract(cfg),
                Task::Training => run_training(cfg),
                Task::Filter => run_filter(cfg, None, None),
            }
        }
    }
}

fn run_extract(cfg: config::Config) -> Result<()> {
    let mut ctx = Context::load(cfg, Task::ExtractFaces)?;
    let report = extract::run(&mut ctx)?;
    info!(
        "Extracted {} face(s) from {} image(s) of {} person(s)",
        report.faces, report.images, report.persons
    );
    Ok(())
}

fn run_training(cfg: config::Config) -> Result<()> {
    let mut ctx = Context::load(cfg, Task::Training)?;
    let report = training::run(&mut ctx)?;
    info!("Trained on {} face(s)", report.total_faces());
    Ok(())
}

fn run_filter(cfg: config::Config, src: Option<PathBuf>, dst: Option<PathBuf>) -> Result<()> {
    let (src, dst) = {
        let mut input = io::stdin().lock();
        let mut out = io::stdout();
        let src = match src {
            Some(p) => p,
            None => selector::prompt_path(&mut input, &mut out, "source?")?,
        };
        let dst = match dst {
            Some(p) => p,
            None => selector::prompt_path(&mut input, &mut out, "destination?")?,
        };
        (src, dst)
    };

    let mut ctx = Context::load(cfg, Task::Filter)?;
    filter::run(&mut ctx, &src, &dst)?;
    Ok(())
}

fn write_config(cfg: &config::Config, path: Option<&Path>) -> Result<()> {
    config::save_config(cfg, path)?;
    info!(
        "Config written to {}",
        path.unwrap_or(&config::CONFIG_PATH).display()
    );
    Ok(())
}
