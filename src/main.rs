// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! FrameShift: Visual Comparison Client
//!
//! Sends a before/after image pair to the FrameShift analysis service and
//! prints the detected changes.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};

use frameshift::client::AnalysisClient;
use frameshift::config::{AppConfig, ENDPOINT_ENV};
use frameshift::options::{AnalysisConfig, OptionKey, OptionValue, Preset};
use frameshift::render::ResultView;
use frameshift::result::AnalysisResult;
use frameshift::session::{Event, Session, Transition};
use frameshift::upload::{select_image, Slot};
use frameshift::{FrameShiftError, Result};

/// FrameShift CLI - Visual Comparison Engine for Time-Series Images
#[derive(Parser, Debug)]
#[command(name = "frameshift")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.1.0")]
#[command(about = "Compare two images with the FrameShift analysis service", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare a before and an after image
    Analyze {
        /// Image 1 (before)
        before: PathBuf,

        /// Image 2 (after)
        after: PathBuf,

        /// Analysis endpoint (overrides config and environment)
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Start from a recommended option set
        #[arg(short, long, value_enum)]
        preset: Option<Preset>,

        /// Region-of-interest selection
        #[arg(long)]
        use_roi: Option<bool>,

        /// Remove background before comparison
        #[arg(long)]
        remove_background: Option<bool>,

        /// Detect texture changes
        #[arg(long)]
        use_edge_detection: Option<bool>,

        /// Ignore text labels and overlays
        #[arg(long)]
        filter_text_regions: Option<bool>,

        /// Change threshold, clamped to 0.05-0.30
        #[arg(short, long)]
        sensitivity: Option<f64>,

        /// Set an option as key=value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Write the returned images into this directory
        #[arg(long)]
        save_artifacts: Option<PathBuf>,
    },

    /// Check that the analysis service is reachable
    Status {
        /// Analysis endpoint (overrides config and environment)
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// List the analysis options and presets
    Options,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,
}

/// Option flags given to `analyze`
#[derive(Debug, Default)]
struct OptionOverrides {
    preset: Option<Preset>,
    toggles: Vec<(OptionKey, bool)>,
    sensitivity: Option<f64>,
    assignments: Vec<String>,
}

impl OptionOverrides {
    /// Preset first, then individual flags, then `--set` in order given
    fn apply(&self, base: &AnalysisConfig) -> Result<AnalysisConfig> {
        let mut config = match self.preset {
            Some(preset) => preset.apply(base),
            None => *base,
        };
        for (key, value) in &self.toggles {
            config = config.set_option(*key, OptionValue::Bool(*value))?;
        }
        if let Some(sensitivity) = self.sensitivity {
            config = config.set_option(OptionKey::Sensitivity, OptionValue::Float(sensitivity))?;
        }
        for assignment in &self.assignments {
            config = config.apply_assignment(assignment)?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load_with_env(&cli.config)?;

    match cli.command {
        Commands::Analyze {
            before,
            after,
            endpoint,
            preset,
            use_roi,
            remove_background,
            use_edge_detection,
            filter_text_regions,
            sensitivity,
            set,
            save_artifacts,
        } => {
            config.apply_endpoint_override(endpoint);
            let toggles = [
                (OptionKey::UseRoi, use_roi),
                (OptionKey::RemoveBackground, remove_background),
                (OptionKey::UseEdgeDetection, use_edge_detection),
                (OptionKey::FilterTextRegions, filter_text_regions),
            ]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
            let overrides = OptionOverrides {
                preset,
                toggles,
                sensitivity,
                assignments: set,
            };
            run_analyze(config, &before, &after, &overrides, save_artifacts, &cli.format).await
        }
        Commands::Status { endpoint } => {
            config.apply_endpoint_override(endpoint);
            run_status(config).await
        }
        Commands::Options => {
            run_options(&config);
            Ok(())
        }
        Commands::Config { action } => run_config_command(config, action, &cli.config),
    }
}

/// Run one comparison
async fn run_analyze(
    config: AppConfig,
    before: &Path,
    after: &Path,
    overrides: &OptionOverrides,
    save_artifacts: Option<PathBuf>,
    format: &str,
) -> Result<()> {
    let analysis = overrides.apply(&config.analysis)?;
    let endpoint = config.service.endpoint_url()?;
    let client = AnalysisClient::new(endpoint)?;
    info!("Analysis endpoint: {}", client.endpoint());
    debug!("Options: {:?}", analysis);

    let mut session = Session::new(analysis);
    let max_preview = config.preview.max_dimension;

    let (first, second) = tokio::join!(
        select_image(Slot::Before, before, max_preview),
        select_image(Slot::After, after, max_preview),
    );

    for (slot, path, loaded) in [(Slot::Before, before, first), (Slot::After, after, second)] {
        let event = match loaded {
            Ok(image) => Event::ImageSelected(slot, image),
            Err(e) => {
                eprintln!("Could not read {} image {:?}: {}", slot, path, e);
                Event::ImageFailed {
                    slot,
                    file_name: path.display().to_string(),
                    reason: e.to_string(),
                }
            }
        };
        session.apply(event);
    }

    match session.analyze(&client).await {
        Transition::Succeeded => {}
        Transition::Failed(e) | Transition::Rejected(e) => return Err(e),
        other => {
            return Err(FrameShiftError::Config(format!("Unexpected session state: {:?}", other)))
        }
    }

    let done = session
        .result()
        .ok_or_else(|| FrameShiftError::Config("Analysis finished without a result".into()))?;

    print_result(&done.result, format)?;

    if let Some(dir) = save_artifacts {
        for path in write_artifacts(&done.result, &dir).await? {
            println!("Saved {}", path.display());
        }
    }

    Ok(())
}

fn print_result(result: &AnalysisResult, format: &str) -> Result<()> {
    let view = ResultView::new(result);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        _ => print!("{}", view),
    }
    Ok(())
}

/// Decode every returned image into `dir`, returning the written paths
async fn write_artifacts(result: &AnalysisResult, dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::new();
    for artifact in result.artifacts() {
        let bytes = artifact.decode()?;
        let path = dir.join(artifact.file_name());
        tokio::fs::write(&path, &bytes).await?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        written.push(path);
    }
    Ok(written)
}

/// Show service status
async fn run_status(config: AppConfig) -> Result<()> {
    let client = AnalysisClient::new(config.service.endpoint_url()?)?;

    println!("Analysis endpoint: {}", client.endpoint());
    let status = client.status().await?;
    println!("Service: {}", if status.message.is_empty() { "(no message)" } else { &status.message });
    println!("Status:  {}", if status.status.is_empty() { "unknown" } else { &status.status });

    Ok(())
}

fn describe_value(value: OptionValue) -> String {
    match value {
        OptionValue::Bool(true) => "on".to_string(),
        OptionValue::Bool(false) => "off".to_string(),
        OptionValue::Float(v) => format!("{:.2}", v),
    }
}

/// List options with their current defaults
fn run_options(config: &AppConfig) {
    println!("Analysis options:\n");
    for key in OptionKey::ALL {
        println!(
            "  {:<22} {:<5} {} - {}",
            key.as_str(),
            describe_value(config.analysis.get(key)),
            key.label(),
            key.description()
        );
    }

    println!("\nPresets (--preset):\n");
    for preset in [Preset::TireWear, Preset::DifferentPov, Preset::Broadcast] {
        let name = clap::ValueEnum::to_possible_value(&preset)
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        let enables: Vec<&str> = preset.enables().iter().map(|k| k.label()).collect();
        println!("  {:<14} {}: {}", name, preset.title(), enables.join(" + "));
    }
}

/// Run config subcommands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if std::env::var(ENDPOINT_ENV).is_ok() {
                println!("\n(endpoint taken from {})", ENDPOINT_ENV);
            }
        }
        ConfigCommands::Generate { output, force } => {
            if output.exists() && !force {
                return Err(FrameShiftError::Config(format!(
                    "{:?} already exists, use --force to overwrite",
                    output
                )));
            }
            AppConfig::default().save(&output)?;
            println!("Wrote default configuration to {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration {:?} is valid", config_path);
            println!("Endpoint: {}", config.service.endpoint_url()?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["frameshift"]).is_err());
    }

    #[test]
    fn test_cli_analyze_command() {
        let cli = Cli::try_parse_from([
            "frameshift", "analyze", "before.png", "after.png",
            "--use-roi", "true", "--sensitivity", "0.2", "--set", "filter_text_regions=off",
        ]).unwrap();

        match cli.command {
            Commands::Analyze { before, after, use_roi, sensitivity, set, remove_background, .. } => {
                assert_eq!(before, PathBuf::from("before.png"));
                assert_eq!(after, PathBuf::from("after.png"));
                assert_eq!(use_roi, Some(true));
                assert_eq!(remove_background, None);
                assert_eq!(sensitivity, Some(0.2));
                assert_eq!(set, vec!["filter_text_regions=off".to_string()]);
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_cli_preset_and_format() {
        let cli = Cli::try_parse_from([
            "frameshift", "--format", "json", "analyze", "a.png", "b.png", "--preset", "tire-wear",
        ]).unwrap();
        assert_eq!(cli.format, "json");
        match cli.command {
            Commands::Analyze { preset, .. } => assert_eq!(preset, Some(Preset::TireWear)),
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_overrides_order() {
        let mut base = AnalysisConfig::default();
        base.remove_background = false;

        let overrides = OptionOverrides {
            preset: Some(Preset::TireWear),
            toggles: vec![(OptionKey::UseEdgeDetection, false)],
            sensitivity: Some(0.01),
            assignments: vec!["sensitivity=0.25".into()],
        };
        let config = overrides.apply(&base).unwrap();
        assert!(config.remove_background);
        assert!(!config.use_edge_detection);
        assert_eq!(config.sensitivity.value(), 0.25);
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let result = AnalysisResult {
            difference_map: Some("aGVsbG8=".into()),
            annotated_image: None,
            ..Default::default()
        };
        let written = tokio_test::block_on(write_artifacts(&result, dir.path())).unwrap();
        assert_eq!(written, vec![dir.path().join("difference_map.png")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"hello");
    }
}
