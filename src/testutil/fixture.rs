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
use crate::bank::{BankFlags, Codec, FormatLayout, TrackFormat, BANK_MAGIC};

/// Little-endian bytes of 16-bit samples.
pub fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// One IMA ADPCM block that decodes to `predictor` on every sample: each
/// channel header holds the predictor at step index 0 and every nibble is 0.
pub fn ima_block(channels: u16, alignment: u8, predictor: i16) -> Vec<u8> {
    let block_align = (usize::from(alignment) + 22) * usize::from(channels);
    let mut block = vec![0u8; block_align];
    for channel in 0..usize::from(channels) {
        block[channel * 4..channel * 4 + 2].copy_from_slice(&predictor.to_le_bytes());
    }
    block
}

/// One MS ADPCM block that decodes to `value` on every sample: predictor 0
/// with both history samples at `value`, minimum delta and zero nibbles.
pub fn ms_block(channels: u16, alignment: u8, value: i16) -> Vec<u8> {
    let channels = usize::from(channels);
    let block_align = (usize::from(alignment) + 22) * channels;
    let mut block = vec![0u8; block_align];
    for channel in 0..channels {
        for (field, word) in [(1, 16i16), (3, value), (5, value)] {
            let at = field * channels + channel * 2;
            block[at..at + 2].copy_from_slice(&word.to_le_bytes());
        }
    }
    block
}

/// A track to place in a synthetic bank.
#[derive(Debug, Clone)]
pub struct FixtureTrack {
    pub name: Option<String>,
    pub format: TrackFormat,
    pub payload: Vec<u8>,
    pub duration: u32,
    pub loop_start: u32,
    pub loop_length: u32,
}

impl FixtureTrack {
    pub fn pcm16(channels: u16, sample_rate: u32, samples: &[i16]) -> Self {
        FixtureTrack {
            name: None,
            format: TrackFormat {
                codec: Codec::Pcm,
                channels,
                sample_rate,
                alignment: 0,
                wide_samples: true,
            },
            payload: pcm16_bytes(samples),
            duration: 0,
            loop_start: 0,
            loop_length: 0,
        }
    }

    /// `blocks` silent IMA blocks holding `predictor`.
    pub fn ima(
        channels: u16,
        sample_rate: u32,
        alignment: u8,
        blocks: usize,
        predictor: i16,
    ) -> Self {
        let block = ima_block(channels, alignment, predictor);
        FixtureTrack {
            name: None,
            format: TrackFormat {
                codec: Codec::ImaAdpcm,
                channels,
                sample_rate,
                alignment,
                wide_samples: false,
            },
            payload: block.repeat(blocks),
            duration: 0,
            loop_start: 0,
            loop_length: 0,
        }
    }

    /// `blocks` MS ADPCM blocks holding `value`.
    pub fn ms(
        channels: u16,
        sample_rate: u32,
        alignment: u8,
        blocks: usize,
        value: i16,
    ) -> Self {
        FixtureTrack {
            name: None,
            format: TrackFormat {
                codec: Codec::MsAdpcm,
                channels,
                sample_rate,
                alignment,
                wide_samples: false,
            },
            payload: ms_block(channels, alignment, value).repeat(blocks),
            duration: 0,
            loop_start: 0,
            loop_length: 0,
        }
    }

    /// A zero-length entry.
    pub fn placeholder() -> Self {
        FixtureTrack {
            payload: Vec::new(),
            ..FixtureTrack::pcm16(1, 22050, &[])
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.format.codec = codec;
        self
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_loop(mut self, loop_start: u32, loop_length: u32) -> Self {
        self.loop_start = loop_start;
        self.loop_length = loop_length;
        self
    }
}

/// Writes synthetic banks in any supported version.
#[derive(Debug, Clone)]
pub struct BankBuilder {
    version: u32,
    name: String,
    flags: u32,
    alignment: u32,
    compact: bool,
    entry_name_size: u32,
    tracks: Vec<FixtureTrack>,
    offset_overrides: Vec<(usize, u32)>,
    legacy_play_segment: (u32, u32),
}

const ENTRY_STRIDE: u32 = 24;

impl BankBuilder {
    pub fn new(version: u32) -> Self {
        BankBuilder {
            version,
            name: "fixture".to_string(),
            flags: 0,
            alignment: 4,
            compact: false,
            entry_name_size: 64,
            tracks: Vec::new(),
            offset_overrides: Vec::new(),
            legacy_play_segment: (0, 0),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn streaming(mut self) -> Self {
        self.flags |= BankFlags::STREAMING;
        self
    }

    pub fn alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment.max(1);
        self
    }

    /// Writes a compact table. Every track must share the first track's format.
    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    pub fn track(mut self, track: FixtureTrack) -> Self {
        self.tracks.push(track);
        self
    }

    /// Fills the fourth segment of a version 1 header, which readers ignore.
    pub fn legacy_play_segment(mut self, offset: u32, length: u32) -> Self {
        self.legacy_play_segment = (offset, length);
        self
    }

    /// Writes `offset` into an entry's table record instead of the real one.
    pub fn entry_offset(mut self, index: usize, offset: u32) -> Self {
        self.offset_overrides.push((index, offset));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let layout = FormatLayout::for_version(self.version);
        let legacy_segments = self.version <= 3;
        let segment_count = if legacy_segments { 4 } else { 5 };
        let header_version_len = if self.version >= 42 { 4 } else { 0 };
        let header_len = 8 + header_version_len + segment_count * 8;
        let has_names = self.version >= 2 && self.tracks.iter().any(|t| t.name.is_some());

        // Payloads, each starting on the alignment.
        let alignment = self.alignment as usize;
        let mut play_region = Vec::new();
        let mut offsets = Vec::new();
        for track in &self.tracks {
            pad_to(&mut play_region, alignment);
            offsets.push(play_region.len() as u32);
            play_region.extend_from_slice(&track.payload);
        }
        for &(index, offset) in &self.offset_overrides {
            offsets[index] = offset;
        }

        let mut flags = self.flags;
        if self.compact {
            flags |= BankFlags::COMPACT;
        }
        if has_names {
            flags |= BankFlags::ENTRY_NAMES;
        }

        let mut bank_data = Vec::new();
        put(&mut bank_data, flags);
        put(&mut bank_data, self.tracks.len() as u32);
        let name_len = if self.version == 2 || self.version == 3 { 16 } else { 64 };
        let mut name = self.name.clone().into_bytes();
        name.resize(name_len, 0);
        bank_data.extend_from_slice(&name);

        let mut metadata = Vec::new();
        for (track, &offset) in self.tracks.iter().zip(&offsets) {
            let format = layout.encode(&track.format);
            if self.version == 1 {
                for word in [
                    format,
                    offset,
                    track.payload.len() as u32,
                    track.loop_start,
                    track.loop_length,
                ] {
                    put(&mut bank_data, word);
                }
            } else if self.compact {
                put(&mut metadata, offset / self.alignment);
            } else {
                for word in [
                    track.duration << 4,
                    format,
                    offset,
                    track.payload.len() as u32,
                    track.loop_start,
                    track.loop_length,
                ] {
                    put(&mut metadata, word);
                }
            }
        }

        if self.version >= 2 {
            put(&mut bank_data, ENTRY_STRIDE);
            put(&mut bank_data, if has_names { self.entry_name_size } else { 0 });
            put(&mut bank_data, self.alignment);
            if self.compact {
                let format = self.tracks.first().map_or(0, |t| layout.encode(&t.format));
                put(&mut bank_data, format);
            }
        }

        let mut names = Vec::new();
        if has_names {
            for track in &self.tracks {
                let mut name = track.name.clone().unwrap_or_default().into_bytes();
                name.resize(self.entry_name_size as usize, 0);
                names.extend_from_slice(&name);
            }
        }

        let bank_data_offset = header_len;
        let metadata_offset = bank_data_offset + bank_data.len();
        let names_offset = metadata_offset + metadata.len();
        let mut out = Vec::new();
        out.extend_from_slice(&BANK_MAGIC);
        put(&mut out, self.version);
        if self.version >= 42 {
            put(&mut out, 0);
        }

        let mut body = Vec::new();
        body.extend_from_slice(&bank_data);
        body.extend_from_slice(&metadata);
        body.extend_from_slice(&names);
        let mut play_offset = header_len + body.len();
        if self.version > 1 {
            play_offset = play_offset.div_ceil(alignment) * alignment;
        }

        let segment = |offset: usize, length: usize| -> (u32, u32) {
            if length == 0 {
                (0, 0)
            } else {
                (offset as u32, length as u32)
            }
        };
        let mut segments = vec![segment(bank_data_offset, bank_data.len())];
        segments.push(segment(metadata_offset, metadata.len()));
        if !legacy_segments {
            // Seek tables are never written.
            segments.push((0, 0));
        }
        segments.push(segment(names_offset, names.len()));
        if self.version == 1 {
            // Version 1 banks locate the play region after the entry table.
            segments.push(self.legacy_play_segment);
        } else {
            segments.push((play_offset as u32, play_region.len() as u32));
        }
        for (offset, length) in segments {
            put(&mut out, offset);
            put(&mut out, length);
        }

        out.extend_from_slice(&body);
        out.resize(play_offset, 0);
        out.extend_from_slice(&play_region);
        out
    }
}

fn put(out: &mut Vec<u8>, word: u32) {
    out.extend_from_slice(&word.to_le_bytes());
}

fn pad_to(out: &mut Vec<u8>, alignment: usize) {
    let padded = out.len().div_ceil(alignment) * alignment;
    out.resize(padded, 0);
}
