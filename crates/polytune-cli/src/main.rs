use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use polytune_midi::{
    config, list_output_ports, map_frequency, MidiOut, MidirSink, RecordingSink, Score,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ports => execute_ports(),
        Commands::Map { frequencies } => execute_map(&frequencies),
        Commands::Play(args) => execute_play(args),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Microtonal MIDI playback over pitch-bent channels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available MIDI output ports.
    Ports,
    /// Show the MIDI note and cents offset for frequencies in Hz.
    Map {
        #[arg(required = true)]
        frequencies: Vec<f64>,
    },
    /// Play a score file on a MIDI output port.
    Play(PlayArgs),
}

#[derive(Args)]
struct PlayArgs {
    /// Path to the score (JSON array of {frequency, start_ms, end_ms}).
    score: PathBuf,
    /// Output port index.
    #[arg(long, conflicts_with = "port_name")]
    port: Option<usize>,
    /// Output port name, matched as a substring.
    #[arg(long)]
    port_name: Option<String>,
    /// Channels to allocate voices on, e.g. 0,1,2.
    #[arg(long, value_delimiter = ',')]
    channels: Option<Vec<u8>>,
    /// Pitch bend range in semitones.
    #[arg(long)]
    bend_range: Option<u8>,
    /// Settings file to use instead of the user config.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the messages instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

fn execute_ports() -> Result<()> {
    let ports = list_output_ports().context("failed to list MIDI outputs")?;
    if ports.is_empty() {
        println!("No MIDI output ports detected.");
    } else {
        println!("Available MIDI outputs:");
        for (index, port) in ports.iter().enumerate() {
            println!("  {index}: {port}");
        }
    }
    Ok(())
}

fn execute_map(frequencies: &[f64]) -> Result<()> {
    for &hz in frequencies {
        let mapping = map_frequency(hz)?;
        let range = if mapping.in_midi_range() {
            ""
        } else {
            " (out of range)"
        };
        println!(
            "{hz:>10.3} Hz -> note {:>4} {:+8.3} cents{range}",
            mapping.note, mapping.cents
        );
    }
    Ok(())
}

fn execute_play(args: PlayArgs) -> Result<()> {
    let mut settings = match &args.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    if let Some(channels) = args.channels.clone() {
        settings.channels = channels;
    }
    if let Some(range) = args.bend_range {
        settings.pitch_bend_range = range;
    }
    if let Some(name) = args.port_name.clone() {
        settings.port_name = Some(name);
    }

    let data = fs::read_to_string(&args.score)
        .with_context(|| format!("failed to read score {}", args.score.display()))?;
    let score: Score = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a valid score file", args.score.display()))?;

    if args.dry_run {
        let sink = RecordingSink::new();
        let mut out = MidiOut::new(Some(sink.clone()), &settings)?;
        out.play_score(&score)?;
        for event in sink.events() {
            println!("{}", serde_json::to_string(&event)?);
        }
        return Ok(());
    }

    let sink = match (args.port, settings.port_name.as_deref()) {
        (Some(index), _) => MidirSink::open_index(index)?,
        (None, Some(name)) => MidirSink::open_named(name)?,
        (None, None) => MidirSink::open_index(0)?,
    };
    println!(
        "Playing {} notes on '{}' ({} channels)",
        score.notes.len(),
        sink.name(),
        settings.channels.len()
    );

    let mut out = MidiOut::new(Some(sink), &settings)?
        .with_logger(|line| tracing::debug!(target: "polytune::dispatch", "{line}"));
    let started = out.now();
    out.play_score(&score)?;
    tracing::info!(
        length_ms = score.length_ms(),
        scheduled_in_ms = out.now() - started,
        "score scheduled"
    );

    // The sink keeps sending until its queue is empty.
    let sink = out.into_sink().context("output has no sink")?;
    sink.finish()
}
