// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use wavebank::config::{self, EngineConfig};
use wavebank::voice::{cpal, mock, VoiceBackend};
use wavebank::{AudioEngine, LoadMode, LoopCount, PlayParams, PlaybackEventKind, TrackRef};

/// How often `play` runs the engine's maintenance sweep.
const UPDATE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A streaming wave-bank player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints a bank's header and track table.
    Info {
        /// The path to the bank.
        bank: PathBuf,
    },
    /// Decodes every track in a bank and reports the ones that fail.
    Verify {
        /// The path to the bank.
        bank: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a track from a bank.
    Play {
        /// The path to the bank.
        bank: PathBuf,
        /// The track to play, by index or by name.
        track: String,
        /// Times to restart the track after the first pass. 255 loops forever.
        #[arg(short, long, default_value_t = 0)]
        loops: u8,
        /// Stream the track instead of decoding the whole bank first.
        #[arg(short, long)]
        stream: bool,
        /// The path to an engine config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { bank } => {
            let engine = AudioEngine::new(&EngineConfig::new("mock"), mock_backend())?;
            let bank = engine.open_bank(&bank, LoadMode::Streaming)?;
            let container = bank.container();

            println!("Bank: {}", container.name());
            println!("Version: {}", container.version());
            println!("Flags: {:#010x}", container.flags().bits());
            println!("Streaming: {}", container.flags().is_streaming());
            println!("Alignment: {}", container.alignment());
            println!(
                "Play region: {}+{}",
                container.play_region_offset(),
                container.play_region_length()
            );
            println!("\nTracks (count: {}):", container.track_count());
            for entry in container.entries() {
                let format = &entry.format;
                println!(
                    "- {:>3} {:<24} {} {}ch {}Hz {} frames ({:.2}s){}",
                    entry.index,
                    entry.name.as_deref().unwrap_or("-"),
                    format.codec,
                    format.channels,
                    format.sample_rate,
                    entry.total_samples,
                    entry.duration().as_secs_f64(),
                    if entry.has_loop_region() {
                        format!(" loop {}+{}", entry.loop_start, entry.loop_length)
                    } else {
                        String::new()
                    }
                );
            }
        }
        Commands::Verify { bank } => {
            let engine = AudioEngine::new(&EngineConfig::new("mock"), mock_backend())?;
            let bank = engine.open_bank(&bank, LoadMode::Resident)?;
            let failures = bank.failures();

            if failures.is_empty() {
                println!(
                    "All {} tracks in {} decoded.",
                    bank.container().track_count(),
                    bank.name()
                );
                return Ok(());
            }

            println!("Failed tracks (count: {}):", failures.len());
            for (index, reason) in failures {
                println!("- {}: {}", index, reason);
            }
            return Err("bank has tracks that failed to load".into());
        }
        Commands::Devices {} => {
            let devices = cpal::Backend::list()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            bank,
            track,
            loops,
            stream,
            config: config_path,
        } => {
            let engine_config = match config_path {
                Some(path) => config::load_engine_config(&path)?,
                None => EngineConfig::default(),
            };
            let engine = AudioEngine::from_config(&engine_config)?;
            let mode = if stream {
                LoadMode::Streaming
            } else {
                LoadMode::Auto
            };
            let bank = engine.open_bank(&bank, mode)?;
            let track_ref = match track.parse::<u32>() {
                Ok(index) => TrackRef::Index(index),
                Err(_) => TrackRef::Name(&track),
            };

            let id = engine.play(
                &bank,
                track_ref,
                PlayParams {
                    loop_count: LoopCount::from(loops),
                    ..PlayParams::default()
                },
            )?;
            println!("Playing {} from {} on {}", track_ref, bank.name(), engine.backend().name());

            loop {
                match engine.events().recv_timeout(UPDATE_INTERVAL) {
                    Ok(event) if event.instance == id => {
                        engine.update();
                        match event.kind {
                            PlaybackEventKind::Finished => {
                                println!("Finished.");
                                return Ok(());
                            }
                            PlaybackEventKind::Error(message) => return Err(message.into()),
                        }
                    }
                    Ok(_) | Err(RecvTimeoutError::Timeout) => {
                        engine.update();
                    }
                    Err(RecvTimeoutError::Disconnected) => return Ok(()),
                }
            }
        }
    }

    Ok(())
}

/// A back-end for commands that never play anything.
fn mock_backend() -> Arc<dyn VoiceBackend> {
    Arc::new(mock::Backend::new())
}
