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
use std::{
    collections::{HashMap, VecDeque},
    f32::consts::FRAC_PI_4,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::{BackendError, BufferNeeded, VoiceBackend, VoiceParams};
use crate::bank::PcmFormat;

/// Frames mixed per block.
const BLOCK_FRAMES: usize = 512;

/// Mixed blocks waiting for the device callback.
const BLOCKS_IN_FLIGHT: usize = 4;

/// Describes an output device found on one of the cpal hosts.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

#[derive(Default)]
struct MixVoice {
    format: Option<PcmFormat>,
    queue: VecDeque<Vec<u8>>,
    offset: usize,
    /// Fractional frame carried between output frames.
    phase: f64,
    position: u64,
    playing: bool,
    paused: bool,
    params: VoiceParams,
    callback: Option<Arc<dyn BufferNeeded>>,
}

impl MixVoice {
    fn is_audible(&self) -> bool {
        self.playing && !self.paused && self.format.is_some()
    }

    /// Drops fully played buffers. Returns true if any were dropped.
    fn retire_played(&mut self) -> bool {
        let mut retired = false;
        while let Some(len) = self.queue.front().map(Vec::len) {
            if self.offset < len {
                break;
            }
            self.offset -= len;
            self.queue.pop_front();
            retired = true;
        }
        retired
    }

    /// Returns the current frame as a (left, right) pair in -1.0..1.0.
    fn current_frame(&self, format: &PcmFormat) -> Option<(f32, f32)> {
        let front = self.queue.front()?;
        let sample = |channel: usize| -> f32 {
            match format.bits_per_sample {
                8 => {
                    let index = self.offset + channel;
                    (f32::from(front[index]) - 128.0) / 128.0
                }
                _ => {
                    let index = self.offset + channel * 2;
                    f32::from(i16::from_le_bytes([front[index], front[index + 1]])) / 32768.0
                }
            }
        };
        let left = sample(0);
        let right = if format.channels > 1 { sample(1) } else { left };
        Some((left, right))
    }
}

/// Mixes every started voice into one output buffer.
struct Mixer {
    voices: Mutex<HashMap<usize, MixVoice>>,
    channels: u16,
    sample_rate: u32,
}

impl Mixer {
    /// Adds one block of every audible voice into `out` and returns the
    /// callbacks to raise once the lock is dropped.
    fn mix(&self, out: &mut [f32]) -> Vec<(usize, Arc<dyn BufferNeeded>)> {
        out.fill(0.0);
        let channels = usize::from(self.channels.max(1));
        let frames = out.len() / channels;
        let mut callbacks = Vec::new();

        let mut voices = self.voices.lock();
        for (&index, voice) in voices.iter_mut() {
            if !voice.is_audible() {
                continue;
            }
            let Some(format) = voice.format else {
                continue;
            };
            let frame_size = format.frame_size().max(1);
            let step = f64::from(format.sample_rate) * f64::from(voice.params.pitch.max(0.0))
                / f64::from(self.sample_rate.max(1));

            // Equal power pan.
            let angle = (voice.params.pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
            let left_gain = angle.cos() * voice.params.volume;
            let right_gain = angle.sin() * voice.params.volume;

            let mut completed = false;
            for frame in 0..frames {
                let Some((left, right)) = voice.current_frame(&format) else {
                    break;
                };
                let base = frame * channels;
                if channels == 1 {
                    out[base] += (left * left_gain + right * right_gain) * 0.5;
                } else {
                    out[base] += left * left_gain;
                    out[base + 1] += right * right_gain;
                }

                voice.phase += step;
                let advance = voice.phase.floor();
                voice.phase -= advance;
                voice.offset += advance as usize * frame_size;
                voice.position += advance as u64;
                completed |= voice.retire_played();
            }

            if completed || voice.queue.is_empty() {
                if let Some(callback) = &voice.callback {
                    callbacks.push((index, callback.clone()));
                }
            }
        }
        callbacks
    }
}

/// Plays voices through a cpal output device. A mix thread fills blocks and
/// raises buffer-needed callbacks, the device callback only copies blocks out.
pub struct Backend {
    info: DeviceInfo,
    mixer: Arc<Mixer>,
    running: Arc<AtomicBool>,
}

impl Backend {
    /// Lists output devices on every available host.
    pub fn list() -> Result<Vec<DeviceInfo>, BackendError> {
        Ok(list_cpal_devices()?
            .into_iter()
            .map(|(info, _)| info)
            .collect())
    }

    /// Opens the named output device and starts mixing into it.
    pub fn open(name: &str) -> Result<Backend, BackendError> {
        let span = span!(Level::INFO, "open cpal device");
        let _enter = span.enter();

        let Some((info, device)) = list_cpal_devices()?
            .into_iter()
            .find(|(info, _)| info.name.trim() == name)
        else {
            return Err(BackendError::DeviceNotFound(name.to_string()));
        };

        let default_config = device
            .default_output_config()
            .map_err(|e| BackendError::Device(e.to_string()))?;
        let channels = default_config.channels().clamp(1, 2);
        let sample_rate = default_config.sample_rate().max(1);

        let mixer = Arc::new(Mixer {
            voices: Mutex::new(HashMap::new()),
            channels,
            sample_rate,
        });
        let running = Arc::new(AtomicBool::new(true));
        let (filled_tx, filled_rx) = crossbeam_channel::bounded::<Vec<f32>>(BLOCKS_IN_FLIGHT);
        let (recycle_tx, recycle_rx) = crossbeam_channel::unbounded::<Vec<f32>>();

        {
            let mixer = mixer.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("wavebank-mix".to_string())
                .spawn(move || run_mixer(mixer, running, filled_tx, recycle_rx))?;
        }

        {
            let running = running.clone();
            let config = cpal::StreamConfig {
                channels,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            // cpal streams are not Send, so the stream lives on its own thread.
            thread::Builder::new()
                .name("wavebank-output".to_string())
                .spawn(move || {
                    let mut current: Vec<f32> = Vec::new();
                    let mut read = 0;
                    let stream = device.build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            let mut written = 0;
                            while written < data.len() {
                                if read == current.len() {
                                    match filled_rx.try_recv() {
                                        Ok(block) => {
                                            let used = std::mem::replace(&mut current, block);
                                            let _ = recycle_tx.send(used);
                                            read = 0;
                                        }
                                        Err(_) => break,
                                    }
                                }
                                let take = (current.len() - read).min(data.len() - written);
                                data[written..written + take]
                                    .copy_from_slice(&current[read..read + take]);
                                written += take;
                                read += take;
                            }
                            // Zero-fill any shortfall
                            data[written..].fill(0.0);
                        },
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    );

                    match stream {
                        Ok(stream) => {
                            if let Err(e) = stream.play() {
                                error!("Failed to start CPAL stream: {}", e);
                                return;
                            }
                            info!("CPAL output stream started successfully");
                            while running.load(Ordering::Relaxed) {
                                thread::sleep(Duration::from_millis(100));
                            }
                        }
                        Err(e) => error!("Failed to create CPAL stream: {}", e),
                    }
                })?;
        }

        info!(device = %info, channels, sample_rate, "Opened output device");
        Ok(Backend {
            info,
            mixer,
            running,
        })
    }

    fn with_voice<T>(&self, voice: usize, f: impl FnOnce(&mut MixVoice) -> T) -> T {
        f(self.mixer.voices.lock().entry(voice).or_default())
    }
}

fn run_mixer(
    mixer: Arc<Mixer>,
    running: Arc<AtomicBool>,
    filled_tx: Sender<Vec<f32>>,
    recycle_rx: Receiver<Vec<f32>>,
) {
    let block_samples = BLOCK_FRAMES * usize::from(mixer.channels);
    while running.load(Ordering::Relaxed) {
        let mut block = recycle_rx
            .try_recv()
            .unwrap_or_else(|_| vec![0.0; block_samples]);
        block.resize(block_samples, 0.0);

        for (voice, callback) in mixer.mix(&mut block) {
            callback.buffer_needed(voice);
        }

        // Block until the device has room, checking for shutdown now and then.
        let mut pending = block;
        loop {
            match filled_tx.send_timeout(pending, Duration::from_millis(100)) {
                Ok(()) => break,
                Err(crossbeam_channel::SendTimeoutError::Timeout(block)) => {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    pending = block;
                }
                Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, BackendError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                error!(err = e.to_string(), host = host_id.name(), "Unable to open host");
                continue;
            }
        };
        let host_devices = match host.output_devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }
            let name = match device.description() {
                Ok(description) => description.name().trim().to_string(),
                Err(_) => continue,
            };
            devices.push((
                DeviceInfo {
                    name,
                    host: host_id.name().to_string(),
                    max_channels,
                },
                device,
            ));
        }
    }

    devices.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
    Ok(devices)
}

impl VoiceBackend for Backend {
    fn configure(&self, voice: usize, format: PcmFormat) -> Result<(), BackendError> {
        if !matches!(format.bits_per_sample, 8 | 16) || format.channels == 0 {
            return Err(BackendError::Device(format!(
                "cannot mix {}-bit {} channel PCM",
                format.bits_per_sample, format.channels
            )));
        }
        self.with_voice(voice, |v| v.format = Some(format));
        Ok(())
    }

    fn submit(&self, voice: usize, data: &[u8]) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            let Some(format) = v.format else {
                return Err(BackendError::Unconfigured(voice));
            };
            let frame_size = format.frame_size();
            if frame_size == 0 || data.len() % frame_size != 0 {
                return Err(BackendError::PartialFrame {
                    len: data.len(),
                    frame_size,
                });
            }
            if !data.is_empty() {
                v.queue.push_back(data.to_vec());
            }
            Ok(())
        })
    }

    fn start(&self, voice: usize) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            if v.format.is_none() {
                return Err(BackendError::Unconfigured(voice));
            }
            v.playing = true;
            v.paused = false;
            Ok(())
        })
    }

    fn stop(&self, voice: usize) {
        self.with_voice(voice, |v| v.playing = false);
    }

    fn pause(&self, voice: usize) {
        self.with_voice(voice, |v| v.paused = true);
    }

    fn resume(&self, voice: usize) {
        self.with_voice(voice, |v| v.paused = false);
    }

    fn set_params(&self, voice: usize, params: VoiceParams) {
        self.with_voice(voice, |v| v.params = params);
    }

    fn sample_position(&self, voice: usize) -> u64 {
        self.mixer
            .voices
            .lock()
            .get(&voice)
            .map_or(0, |v| v.position)
    }

    fn queued_buffers(&self, voice: usize) -> usize {
        self.mixer
            .voices
            .lock()
            .get(&voice)
            .map_or(0, |v| v.queue.len())
    }

    fn set_buffer_needed(&self, voice: usize, callback: Option<Arc<dyn BufferNeeded>>) {
        self.with_voice(voice, |v| v.callback = callback);
    }

    fn reset(&self, voice: usize) {
        let old = self.mixer.voices.lock().remove(&voice);
        drop(old);
    }

    fn name(&self) -> String {
        self.info.name.clone()
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}
