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
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, DecoderOptions, CODEC_TYPE_ADPCM_IMA_WAV, CODEC_TYPE_ADPCM_MS,
};
use symphonia::core::formats::Packet;

use super::{DecodeError, PcmDecoder};
use crate::bank::{Codec, TrackFormat};

/// Default decoder. PCM is passed through, ADPCM goes through symphonia's
/// block decoders and comes out as 16-bit PCM.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        SymphoniaDecoder
    }
}

impl PcmDecoder for SymphoniaDecoder {
    fn supports(&self, format: &TrackFormat) -> Result<(), DecodeError> {
        if format.channels == 0 {
            return Err(DecodeError::UnsupportedFormat(
                "track has no channels".to_string(),
            ));
        }
        match format.codec {
            Codec::Xma => Err(DecodeError::Unsupported(Codec::Xma)),
            Codec::MsAdpcm | Codec::ImaAdpcm if format.channels > 2 => {
                Err(DecodeError::UnsupportedFormat(format!(
                    "{} supports mono and stereo only, got {} channels",
                    format.codec, format.channels
                )))
            }
            _ => Ok(()),
        }
    }

    fn decode_into(
        &self,
        compressed: &[u8],
        format: &TrackFormat,
        out: &mut Vec<u8>,
    ) -> Result<u64, DecodeError> {
        self.supports(format)?;

        match format.codec {
            Codec::Pcm => {
                let frame_size = format.block_align() as usize;
                let frames = compressed.len() / frame_size;
                out.extend_from_slice(&compressed[..frames * frame_size]);
                Ok(frames as u64)
            }
            Codec::MsAdpcm | Codec::ImaAdpcm => decode_adpcm(compressed, format, out),
            Codec::Xma => Err(DecodeError::Unsupported(Codec::Xma)),
        }
    }
}

fn decode_adpcm(
    compressed: &[u8],
    format: &TrackFormat,
    out: &mut Vec<u8>,
) -> Result<u64, DecodeError> {
    let block_align = format.block_align() as usize;
    let blocks = compressed.len() / block_align;
    if blocks == 0 {
        return Ok(0);
    }

    let frames_per_block = u64::from(format.frames_per_block());
    let packet_frames = blocks as u64 * frames_per_block;
    let channels = if format.channels == 1 {
        Channels::FRONT_LEFT
    } else {
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT
    };
    let codec = match format.codec {
        Codec::MsAdpcm => CODEC_TYPE_ADPCM_MS,
        _ => CODEC_TYPE_ADPCM_IMA_WAV,
    };

    let mut params = CodecParameters::new();
    params
        .for_codec(codec)
        .with_sample_rate(format.sample_rate)
        .with_channels(channels)
        .with_frames_per_block(frames_per_block)
        .with_max_frames_per_packet(packet_frames);

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
    let packet = Packet::new_from_slice(0, 0, packet_frames, &compressed[..blocks * block_align]);
    let decoded = decoder.decode(&packet)?;

    let spec = *decoded.spec();
    let frames = decoded.frames() as u64;
    let mut samples = SampleBuffer::<i16>::new(frames, spec);
    samples.copy_interleaved_ref(decoded);

    out.reserve(samples.samples().len() * 2);
    for sample in samples.samples() {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(frames)
}
