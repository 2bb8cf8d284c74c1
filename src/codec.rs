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

//! The decode primitive shared by the resident and streaming paths.

mod decoder;

pub use decoder::SymphoniaDecoder;

use crate::bank::{Codec, TrackFormat};

/// Error types for decode operations
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Codec {0} is not supported")]
    Unsupported(Codec),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio codec error: {0}")]
    Codec(#[from] symphonia::core::errors::Error),
}

/// Linear PCM produced by a decode call, interleaved little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPcm {
    pub data: Vec<u8>,
    pub frames: u64,
}

/// Turns compressed track bytes into linear PCM.
pub trait PcmDecoder: Send + Sync {
    /// Checks that `format` can be decoded at all, without decoding anything.
    fn supports(&self, format: &TrackFormat) -> Result<(), DecodeError>;

    /// Decodes `compressed` and appends the PCM to `out`. Returns the number
    /// of frames appended. ADPCM input must be a whole number of blocks.
    fn decode_into(
        &self,
        compressed: &[u8],
        format: &TrackFormat,
        out: &mut Vec<u8>,
    ) -> Result<u64, DecodeError>;

    /// Decodes `compressed` into a fresh buffer.
    fn decode(&self, compressed: &[u8], format: &TrackFormat) -> Result<DecodedPcm, DecodeError> {
        let mut data = Vec::new();
        let frames = self.decode_into(compressed, format, &mut data)?;
        Ok(DecodedPcm { data, frames })
    }
}
