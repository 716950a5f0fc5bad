use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use beatgrid_engine::service::DEFAULT_WAVEFORM_POINTS;
use beatgrid_engine::{AnalysisService, ConfigManager, EngineConfig, ExportFormat, TrackId};
use clap::{Parser, Subcommand};

/// Beat grid, click track and song structure analysis.
#[derive(Parser, Debug)]
#[command(name = "beatgrid")]
#[command(about = "Beat grid and song structure analysis")]
struct Args {
    /// Config file (default: <config dir>/beatgrid/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect beats and sections of an audio file
    Analyze {
        file: PathBuf,

        /// Number of structural sections to aim for
        #[arg(long)]
        sections: Option<usize>,

        /// Output format: json or csv
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Write the export here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print click times with downbeat accents
    Clicks { file: PathBuf },

    /// Print loudness sections (drop / breakdown / verse)
    Energy { file: PathBuf },

    /// Shift and re-densify a list of beat times
    Adjust {
        /// Phase offset in seconds
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<f64>,

        /// Tempo multiplier (2 doubles, 0.5 halves)
        #[arg(long)]
        multiplier: Option<f64>,

        /// Beat times in seconds
        #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
        beats: Vec<f64>,
    },

    /// Print min/max peaks for display
    Waveform {
        file: PathBuf,

        #[arg(long, default_value_t = DEFAULT_WAVEFORM_POINTS)]
        points: usize,
    },

    /// Show the active configuration, creating the default file if missing
    Config {
        /// Overwrite the file with defaults
        #[arg(long)]
        reset: bool,
    },
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut manager = ConfigManager::new(args.config.clone());

    match args.command {
        Command::Analyze {
            file,
            sections,
            format,
            output,
        } => {
            let service = AnalysisService::new(load_config(&mut manager)?);
            let id = register(&service, &file)?;
            let target = sections.unwrap_or(service.config().structure.target_sections);
            let report = service
                .analyze_with_sections(id, target)
                .with_context(|| format!("Failed to analyze {}", file.display()))?;

            log::info!(
                "{}: {:.2} BPM, {} beats, {} sections",
                report.filename,
                report.beats.bpm,
                report.beats.beats.len(),
                report.structure.num_sections
            );

            let rendered = service.export(id, format)?;
            match output {
                Some(path) => {
                    fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} export to {}", format, path.display());
                }
                None => println!("{}", rendered),
            }
        }
        Command::Clicks { file } => {
            let service = AnalysisService::new(load_config(&mut manager)?);
            let id = analyzed(&service, &file)?;
            let track = service.click_track(id)?;
            println!("{}", serde_json::to_string_pretty(&track)?);
        }
        Command::Energy { file } => {
            let service = AnalysisService::new(load_config(&mut manager)?);
            let id = analyzed(&service, &file)?;
            let structure = service
                .track(id)?
                .structure
                .context("Analysis produced no structure")?;

            println!("{:>9} {:>9}  label", "start", "end");
            for section in &structure.energy_sections {
                println!(
                    "{:>9.3} {:>9.3}  {}",
                    section.start, section.end, section.label
                );
            }
        }
        Command::Adjust {
            offset,
            multiplier,
            beats,
        } => {
            let service = AnalysisService::new(load_config(&mut manager)?);
            let adjusted = service.adjust_beats(&beats, offset, multiplier)?;
            println!("{}", serde_json::to_string(&adjusted)?);
        }
        Command::Waveform { file, points } => {
            let service = AnalysisService::new(load_config(&mut manager)?);
            let id = register(&service, &file)?;
            let peaks = service.waveform(id, points)?;
            println!("{}", serde_json::to_string(&peaks)?);
        }
        Command::Config { reset } => {
            if reset {
                manager
                    .update_config(EngineConfig::default())
                    .context("Failed to reset configuration")?;
            }
            let config = load_config(&mut manager)?;
            println!("# {}", manager.config_path().display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(manager: &mut ConfigManager) -> Result<EngineConfig, anyhow::Error> {
    manager
        .load()
        .with_context(|| format!("Failed to load {}", manager.config_path().display()))
}

fn register(service: &AnalysisService, file: &Path) -> Result<TrackId, anyhow::Error> {
    service
        .register(file)
        .with_context(|| format!("Failed to load {}", file.display()))
}

fn analyzed(service: &AnalysisService, file: &Path) -> Result<TrackId, anyhow::Error> {
    let id = register(service, file)?;
    service
        .analyze(id)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;
    Ok(id)
}
