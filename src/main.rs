use clap::{Parser, Subcommand};
use music_tools::audio::file_info;
use music_tools::config::load_config;
use music_tools::{instruments, AudioFormat, Config, RestorationSettings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Music Tools: audio, MIDI and MusicXML utilities
#[derive(Parser)]
#[command(name = "musictools")]
#[command(about = "Convert, analyze, restore, separate and visualize music files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe an audio file to MIDI
    AudioToMidi {
        /// Input audio file
        audio_file: PathBuf,

        /// Output MIDI file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert a MIDI file to MusicXML
    MidiToXml {
        /// Input MIDI file
        midi_file: PathBuf,

        /// Output MusicXML file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert a MusicXML file to MIDI
    XmlToMidi {
        /// Input MusicXML file
        musicxml_file: PathBuf,

        /// Output MIDI file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print key, pitch and rhythm statistics of a score
    Analyze {
        /// Input MusicXML or MIDI file
        input_file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the instrument of every part of a score
    ChangeInstrument {
        /// Input MusicXML or MIDI file
        input_file: PathBuf,

        /// Target instrument (class name such as `Violin`, or a name such as `violin`)
        instrument: String,

        /// Output file; `.mid` writes MIDI, anything else MusicXML
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Separate an audio file into stems
    Separate {
        /// Input audio file
        input_file: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Render a multi-panel analysis image of an audio file
    Visualize {
        /// Input audio file
        audio_file: PathBuf,

        /// Output PNG file
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
    /// Reduce noise and equalize an audio file
    Restore {
        /// Input audio file
        input_file: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output_file: Option<PathBuf>,

        /// Noise reduction strength (0.0-1.0)
        #[arg(long)]
        noise_reduction: Option<f32>,

        /// Low frequency gain (0.0-2.0)
        #[arg(long)]
        eq_low: Option<f32>,

        /// Mid frequency gain (0.0-2.0)
        #[arg(long)]
        eq_mid: Option<f32>,

        /// High frequency gain (0.0-2.0)
        #[arg(long)]
        eq_high: Option<f32>,
    },
    /// Convert an audio file to another format
    ConvertFormat {
        /// Input audio file
        input_file: PathBuf,

        /// Target format
        #[arg(short = 'f', long, value_enum)]
        output_format: AudioFormat,

        /// Output file
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
    /// Show file details
    Info {
        /// File to inspect
        file: PathBuf,
    },
    /// List known instrument classes and name synonyms
    Instruments,
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config_file: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let quiet = cli.quiet;

    match cli.command {
        Commands::AudioToMidi { audio_file, output } => {
            let path = music_tools::audio_to_midi(&audio_file, output.as_deref(), &config)?;
            if !quiet {
                println!("MIDI file created: {}", path.display());
            }
        }
        Commands::MidiToXml { midi_file, output } => {
            let path = music_tools::midi_to_musicxml(&midi_file, output.as_deref(), &config)?;
            if !quiet {
                println!("MusicXML file created: {}", path.display());
            }
        }
        Commands::XmlToMidi {
            musicxml_file,
            output,
        } => {
            let path = music_tools::musicxml_to_midi(&musicxml_file, output.as_deref(), &config)?;
            if !quiet {
                println!("MIDI file created: {}", path.display());
            }
        }
        Commands::Analyze { input_file, json } => {
            let report = music_tools::analyze_score(&input_file, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
        Commands::ChangeInstrument {
            input_file,
            instrument,
            output,
        } => {
            let path = music_tools::change_instrument(
                &input_file,
                &instrument,
                output.as_deref(),
                &config,
            )?;
            if !quiet {
                println!("Saved to {}", path.display());
            }
        }
        Commands::Separate {
            input_file,
            output_dir,
        } => {
            let stems = music_tools::separate_audio(&input_file, output_dir.as_deref(), &config)?;
            if !quiet {
                println!("Separated {} stem(s):", stems.len());
                for (name, path) in &stems {
                    println!("  {}: {}", name, path.display());
                }
            }
        }
        Commands::Visualize {
            audio_file,
            output_file,
        } => {
            let path = music_tools::visualize_audio(&audio_file, output_file.as_deref(), &config)?;
            if !quiet {
                println!("Visualization saved to {}", path.display());
            }
        }
        Commands::Restore {
            input_file,
            output_file,
            noise_reduction,
            eq_low,
            eq_mid,
            eq_high,
        } => {
            let defaults = config.restoration.defaults;
            let settings = RestorationSettings {
                noise_reduction: noise_reduction.unwrap_or(defaults.noise_reduction),
                eq_low: eq_low.unwrap_or(defaults.eq_low),
                eq_mid: eq_mid.unwrap_or(defaults.eq_mid),
                eq_high: eq_high.unwrap_or(defaults.eq_high),
            };
            let path = music_tools::restore_audio(
                &input_file,
                output_file.as_deref(),
                &settings,
                &config,
            )?;
            if !quiet {
                println!("Restored audio saved to {}", path.display());
            }
        }
        Commands::ConvertFormat {
            input_file,
            output_format,
            output_file,
        } => {
            let path = music_tools::convert_audio_format(
                &input_file,
                Some(output_format),
                output_file.as_deref(),
                &config,
            )?;
            if !quiet {
                println!("Converted file saved to {}", path.display());
            }
        }
        Commands::Info { file } => {
            let info = file_info(&file)?;
            println!("File: {}", info.name);
            println!("Path: {}", info.path.display());
            println!("Extension: {}", info.extension);
            println!("Size: {} ({} bytes)", info.size_human, info.size);
            if let Some(modified) = info.modified_unix {
                println!("Modified: {} (unix time)", modified);
            }
            if let Some(audio) = info.audio {
                println!("Duration: {:.2} seconds", audio.duration_sec);
                println!("Sample rate: {} Hz", audio.sample_rate);
                println!("Channels: {}", audio.channels);
            }
        }
        Commands::Instruments => {
            println!("Instrument classes:");
            for name in instruments::class_names() {
                println!("  {}", name);
            }
            println!("\nSynonyms:");
            for (synonym, class_name) in instruments::synonyms() {
                println!("  {} -> {}", synonym, class_name);
            }
        }
        Commands::ValidateConfig { config_file } => {
            let config = load_config(config_file)?;
            println!("Configuration is valid");
            if !quiet {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&Config::default())?);
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
