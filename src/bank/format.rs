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

//! Per-entry format descriptors and the packed bitfield layouts they are
//! stored in.

use std::fmt;

/// ADPCM block alignment is stored with this value subtracted, per channel.
const ADPCM_BLOCK_ALIGN_OFFSET: u32 = 22;

/// Codec tag stored in the low bits of an entry's format word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Linear PCM, 8-bit unsigned or 16-bit signed little-endian.
    Pcm,
    /// Console XMA. Recognized so it can be reported, never decoded.
    Xma,
    /// Microsoft ADPCM.
    MsAdpcm,
    /// IMA (DVI) ADPCM.
    ImaAdpcm,
}

impl Codec {
    fn from_tag(tag: u32) -> Codec {
        match tag & 0b11 {
            0 => Codec::Pcm,
            1 => Codec::Xma,
            2 => Codec::MsAdpcm,
            _ => Codec::ImaAdpcm,
        }
    }

    /// Returns the tag value used in the packed format word.
    pub fn tag(self) -> u32 {
        match self {
            Codec::Pcm => 0,
            Codec::Xma => 1,
            Codec::MsAdpcm => 2,
            Codec::ImaAdpcm => 3,
        }
    }

    /// True for the block-compressed ADPCM families.
    pub fn is_adpcm(self) -> bool {
        matches!(self, Codec::MsAdpcm | Codec::ImaAdpcm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Codec::Pcm => "pcm",
            Codec::Xma => "xma",
            Codec::MsAdpcm => "ms-adpcm",
            Codec::ImaAdpcm => "ima-adpcm",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The decoded contents of an entry's format word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFormat {
    pub codec: Codec,
    pub channels: u16,
    pub sample_rate: u32,
    /// Raw 8-bit alignment field as stored in the bank.
    pub alignment: u8,
    /// True for 16-bit PCM, false for 8-bit.
    pub wide_samples: bool,
}

impl TrackFormat {
    /// Bits per sample of the stored data. ADPCM is always 4.
    pub fn bits_per_sample(&self) -> u16 {
        match self.codec {
            Codec::MsAdpcm | Codec::ImaAdpcm => 4,
            _ if self.wide_samples => 16,
            _ => 8,
        }
    }

    /// Size in bytes of one compressed block (one frame for PCM).
    pub fn block_align(&self) -> u32 {
        let channels = u32::from(self.channels);
        match self.codec {
            Codec::MsAdpcm | Codec::ImaAdpcm => {
                (u32::from(self.alignment) + ADPCM_BLOCK_ALIGN_OFFSET) * channels
            }
            Codec::Pcm => channels * u32::from(self.bits_per_sample() / 8),
            Codec::Xma => u32::from(self.alignment),
        }
    }

    /// Number of frames one block decodes to.
    pub fn frames_per_block(&self) -> u32 {
        let channels = u32::from(self.channels.max(1));
        let block_align = self.block_align();
        match self.codec {
            Codec::MsAdpcm => (block_align.saturating_sub(7 * channels) * 2) / channels + 2,
            Codec::ImaAdpcm => (block_align.saturating_sub(4 * channels) * 2) / channels + 1,
            Codec::Pcm | Codec::Xma => 1,
        }
    }

    /// Bits per sample of the linear PCM this format decodes to.
    pub fn decoded_bits_per_sample(&self) -> u16 {
        match self.codec {
            Codec::Pcm if !self.wide_samples => 8,
            _ => 16,
        }
    }

    /// Bytes per decoded interleaved frame.
    pub fn decoded_frame_size(&self) -> usize {
        usize::from(self.channels) * usize::from(self.decoded_bits_per_sample() / 8)
    }

    /// Number of whole frames contained in `byte_len` bytes of stored data.
    pub fn frames_in(&self, byte_len: u64) -> u64 {
        let block_align = u64::from(self.block_align());
        if block_align == 0 {
            return 0;
        }
        (byte_len / block_align) * u64::from(self.frames_per_block())
    }

    /// The format of the PCM produced when this track is decoded.
    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.decoded_bits_per_sample(),
        }
    }
}

/// Describes a linear PCM buffer handed to a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn frame_size(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample / 8)
    }
}

/// Bit positions of each field within a packed format word.
#[derive(Debug, Clone, Copy)]
struct FieldLayout {
    codec_bits: u32,
    channels_shift: u32,
    rate_shift: u32,
    align_shift: u32,
    depth_shift: u32,
}

/// The two known format word layouts, selected by bank version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatLayout {
    /// Version 1: one codec bit, then channels, one unused bit, rate, alignment, depth.
    Legacy,
    /// Version 2 and later: two codec bits, then channels, rate, alignment, depth.
    Modern,
}

impl FormatLayout {
    /// Picks the layout for a bank version.
    pub fn for_version(version: u32) -> FormatLayout {
        if version <= 1 {
            FormatLayout::Legacy
        } else {
            FormatLayout::Modern
        }
    }

    fn fields(self) -> FieldLayout {
        match self {
            FormatLayout::Legacy => FieldLayout {
                codec_bits: 1,
                channels_shift: 1,
                rate_shift: 5,
                align_shift: 23,
                depth_shift: 31,
            },
            FormatLayout::Modern => FieldLayout {
                codec_bits: 2,
                channels_shift: 2,
                rate_shift: 5,
                align_shift: 23,
                depth_shift: 31,
            },
        }
    }

    /// Unpacks a format word.
    pub fn decode(self, word: u32) -> TrackFormat {
        let fields = self.fields();
        TrackFormat {
            codec: Codec::from_tag(word & ((1 << fields.codec_bits) - 1)),
            channels: ((word >> fields.channels_shift) & 0b111) as u16,
            sample_rate: (word >> fields.rate_shift) & ((1 << 18) - 1),
            alignment: ((word >> fields.align_shift) & 0xff) as u8,
            wide_samples: (word >> fields.depth_shift) & 1 == 1,
        }
    }

    /// Packs a format word. Codecs that do not fit the layout's codec bits are truncated.
    pub fn encode(self, format: &TrackFormat) -> u32 {
        let fields = self.fields();
        (format.codec.tag() & ((1 << fields.codec_bits) - 1))
            | ((u32::from(format.channels) & 0b111) << fields.channels_shift)
            | ((format.sample_rate & ((1 << 18) - 1)) << fields.rate_shift)
            | (u32::from(format.alignment) << fields.align_shift)
            | (u32::from(format.wide_samples) << fields.depth_shift)
    }
}
