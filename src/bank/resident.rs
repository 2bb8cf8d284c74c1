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

//! Eager loading: every track is read and decoded when the bank is opened.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{info, warn};

use super::{BankContainer, PcmFormat, TrackEntry};
use crate::codec::PcmDecoder;
use crate::error::EngineError;

/// A track decoded in full to linear PCM.
#[derive(Debug)]
pub struct DecodedAudioBuffer {
    data: Vec<u8>,
    format: PcmFormat,
    frames: u64,
}

impl DecodedAudioBuffer {
    pub fn new(data: Vec<u8>, format: PcmFormat, frames: u64) -> Self {
        DecodedAudioBuffer {
            data,
            format,
            frames,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / f64::from(self.format.sample_rate))
    }
}

/// The decoded tracks of a resident bank. Tracks that failed to load keep
/// the reason so playback requests can report it.
#[derive(Debug)]
pub struct ResidentBank {
    tracks: Vec<Result<Arc<DecodedAudioBuffer>, String>>,
}

impl ResidentBank {
    /// Returns a decoded track, or `TrackLoad` if it failed to load.
    pub fn track(&self, index: u32) -> Result<Arc<DecodedAudioBuffer>, EngineError> {
        match self.tracks.get(index as usize) {
            Some(Ok(buffer)) => Ok(buffer.clone()),
            Some(Err(reason)) => Err(EngineError::TrackLoad {
                track: index,
                reason: reason.clone(),
            }),
            None => Err(EngineError::UnknownTrack(index.to_string())),
        }
    }

    /// Tracks that failed to load, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (u32, &str)> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(index, track)| match track {
                Err(reason) => Some((index as u32, reason.as_str())),
                Ok(_) => None,
            })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Reads every payload in order, then decodes them in parallel.
pub struct ResidentBankLoader<'a> {
    decoder: &'a dyn PcmDecoder,
    pool: &'a rayon::ThreadPool,
}

impl<'a> ResidentBankLoader<'a> {
    pub fn new(decoder: &'a dyn PcmDecoder, pool: &'a rayon::ThreadPool) -> Self {
        ResidentBankLoader { decoder, pool }
    }

    /// Loads every track of `container` from `reader`. Never fails as a whole;
    /// a track that cannot be read or decoded is recorded as invalid.
    pub fn load<R: Read + Seek + ?Sized>(
        &self,
        container: &BankContainer,
        reader: &mut R,
    ) -> ResidentBank {
        let payloads: Vec<Result<Vec<u8>, String>> = container
            .entries()
            .iter()
            .map(|entry| read_payload(container, entry, reader))
            .collect();

        let decoder = self.decoder;
        let tracks: Vec<Result<Arc<DecodedAudioBuffer>, String>> = self.pool.install(|| {
            payloads
                .into_par_iter()
                .zip(container.entries().par_iter())
                .map(|(payload, entry)| decode_track(decoder, entry, payload?))
                .collect()
        });

        for (index, track) in tracks.iter().enumerate() {
            if let Err(reason) = track {
                warn!(
                    bank = container.name(),
                    track = index,
                    reason = %reason,
                    "Track failed to load"
                );
            }
        }
        info!(
            bank = container.name(),
            tracks = tracks.len(),
            failed = tracks.iter().filter(|t| t.is_err()).count(),
            "Loaded resident bank"
        );

        ResidentBank { tracks }
    }
}

fn read_payload<R: Read + Seek + ?Sized>(
    container: &BankContainer,
    entry: &TrackEntry,
    reader: &mut R,
) -> Result<Vec<u8>, String> {
    if entry.is_placeholder() {
        return Err("placeholder entry has no audio".to_string());
    }
    let offset = container.payload_offset(entry);
    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|e| format!("seek to {offset} failed: {e}"))?;
    let mut payload = vec![0u8; entry.file_length as usize];
    reader.read_exact(&mut payload).map_err(|e| {
        format!(
            "short read of {} bytes at {offset}: {e}",
            entry.file_length
        )
    })?;
    Ok(payload)
}

fn decode_track(
    decoder: &dyn PcmDecoder,
    entry: &TrackEntry,
    payload: Vec<u8>,
) -> Result<Arc<DecodedAudioBuffer>, String> {
    let mut data = Vec::new();
    let mut frames = decoder
        .decode_into(&payload, &entry.format, &mut data)
        .map_err(|e| e.to_string())?;

    // Block codecs pad the last block; the entry knows the real length.
    let format = entry.format.pcm_format();
    if entry.total_samples > 0 && frames > entry.total_samples {
        frames = entry.total_samples;
        data.truncate(frames as usize * format.frame_size());
    }
    Ok(Arc::new(DecodedAudioBuffer::new(data, format, frames)))
}
