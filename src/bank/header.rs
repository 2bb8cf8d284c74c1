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

//! Bank container parsing.
//!
//! A bank starts with a "WBND" magic, a version and a table of (offset, length)
//! segments. Versions 1-3 carry four segments, later versions carry five (a
//! seek-table segment is inserted before the entry names). The last segment is
//! always the play region holding the raw track payloads.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::time::Duration;

use tracing::debug;

use super::format::{FormatLayout, TrackFormat};
use crate::error::{EngineError, FormatError};

pub const BANK_MAGIC: [u8; 4] = *b"WBND";

/// Highest container version we know how to read.
pub const MAX_BANK_VERSION: u32 = 46;

/// Versions at or above this carry an extra header version word.
const HEADER_VERSION_FIELD_SINCE: u32 = 42;

/// Stride of a version 1 entry: format, offset, length, loop start, loop length.
const LEGACY_ENTRY_STRIDE: u32 = 20;

/// Compact entries store the offset, in units of the bank alignment, in these bits.
const COMPACT_OFFSET_MASK: u32 = (1 << 21) - 1;

/// Bank-level flags from the bank data segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankFlags(u32);

impl BankFlags {
    pub const STREAMING: u32 = 0x0000_0001;
    pub const ENTRY_NAMES: u32 = 0x0001_0000;
    pub const COMPACT: u32 = 0x0002_0000;
    pub const SYNC_DISABLED: u32 = 0x0004_0000;
    pub const SEEK_TABLES: u32 = 0x0008_0000;

    pub fn new(bits: u32) -> Self {
        BankFlags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// True when the bank was authored for streaming playback.
    pub fn is_streaming(self) -> bool {
        self.contains(Self::STREAMING)
    }

    pub fn is_compact(self) -> bool {
        self.contains(Self::COMPACT)
    }
}

/// An (offset, length) pair from the segment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub offset: u32,
    pub length: u32,
}

impl Segment {
    fn is_empty(&self) -> bool {
        self.offset == 0 || self.length == 0
    }

    fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.length)
    }
}

/// Metadata for one track in a bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEntry {
    pub index: u32,
    pub name: Option<String>,
    /// Per-entry flags (low four bits of the flags/duration word).
    pub flags: u32,
    pub format: TrackFormat,
    /// Payload offset relative to the play region.
    pub file_offset: u64,
    pub file_length: u64,
    pub loop_start: u32,
    pub loop_length: u32,
    pub total_samples: u64,
}

impl TrackEntry {
    /// Placeholder entries reserve an index but carry no audio.
    pub fn is_placeholder(&self) -> bool {
        self.file_length == 0
    }

    pub fn has_loop_region(&self) -> bool {
        self.loop_length > 0
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_samples as f64 / f64::from(self.format.sample_rate))
    }
}

/// A parsed bank. Immutable once built.
#[derive(Debug, Clone)]
pub struct BankContainer {
    version: u32,
    flags: BankFlags,
    name: String,
    alignment: u32,
    entries: Vec<TrackEntry>,
    play_region_offset: u64,
    play_region_length: u64,
}

/// Raw entry fields before lengths are resolved.
struct RawEntry {
    flags_and_duration: u32,
    format: u32,
    offset: u64,
    length: u64,
    loop_start: u32,
    loop_length: u32,
}

impl BankContainer {
    /// Parses an in-memory bank image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        Self::parse(&mut Cursor::new(bytes))
    }

    /// Parses the bank at the start of `reader`. Only reads, never writes.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self, EngineError> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        read_header_bytes(reader, &mut magic, "magic")?;
        if magic != BANK_MAGIC {
            return Err(FormatError::BadMagic(magic).into());
        }

        let version = read_header_u32(reader, "version")?;
        if version == 0 || version > MAX_BANK_VERSION {
            return Err(FormatError::UnsupportedVersion(version).into());
        }
        if version >= HEADER_VERSION_FIELD_SINCE {
            read_header_u32(reader, "header version")?;
        }

        let segment_count = if version <= 3 { 4 } else { 5 };
        let mut segments = Vec::with_capacity(segment_count);
        for _ in 0..segment_count {
            let offset = read_header_u32(reader, "segment table")?;
            let length = read_header_u32(reader, "segment table")?;
            segments.push(Segment { offset, length });
        }
        for (index, segment) in segments.iter().enumerate() {
            if segment.end() > file_len {
                return Err(EngineError::corrupt(format!(
                    "segment {index} ({}+{}) extends past end of file ({file_len} bytes)",
                    segment.offset, segment.length
                )));
            }
        }
        let play_segment = segments[segment_count - 1];
        let names_segment = segments[if version <= 3 { 2 } else { 3 }];

        reader.seek(SeekFrom::Start(u64::from(segments[0].offset)))?;
        let flags = BankFlags::new(read_header_u32(reader, "bank flags")?);
        let entry_count = read_header_u32(reader, "entry count")?;
        let mut name = vec![0u8; if version == 2 || version == 3 { 16 } else { 64 }];
        read_header_bytes(reader, &mut name, "bank name")?;
        let name = trim_name(&name);

        let (entry_stride, entry_name_size, alignment, metadata_offset) = if version == 1 {
            (LEGACY_ENTRY_STRIDE, 0, 0, reader.stream_position()?)
        } else {
            let stride = read_header_u32(reader, "entry stride")?;
            let name_size = read_header_u32(reader, "entry name size")?;
            let alignment = read_header_u32(reader, "alignment")?;
            (stride, name_size, alignment, u64::from(segments[1].offset))
        };
        let compact_format = if flags.is_compact() {
            Some(read_header_u32(reader, "compact format")?)
        } else {
            None
        };

        // Compact tables hold a single offset word per entry.
        let table_stride = if compact_format.is_some() {
            4
        } else {
            entry_stride
        };
        if table_stride < 4 {
            return Err(EngineError::corrupt(format!(
                "entry stride {table_stride} is too small"
            )));
        }

        let table_len = u64::from(entry_count) * u64::from(table_stride);
        if metadata_offset + table_len > file_len {
            return Err(EngineError::corrupt(format!(
                "entry table ({entry_count} x {table_stride} bytes at {metadata_offset}) \
                 extends past end of file"
            )));
        }

        // Version 1 has no play-region segment; the region follows the table.
        let implicit_play_region = version == 1 || play_segment.offset == 0;
        let play_region_offset = if implicit_play_region {
            metadata_offset + table_len
        } else {
            u64::from(play_segment.offset)
        };
        if play_region_offset > file_len {
            return Err(EngineError::corrupt(format!(
                "play region offset {play_region_offset} is past end of file"
            )));
        }
        let play_region_length = if version == 1 || play_segment.length == 0 {
            file_len - play_region_offset
        } else {
            u64::from(play_segment.length)
        };

        reader.seek(SeekFrom::Start(metadata_offset))?;
        let mut table = vec![0u8; table_len as usize];
        reader.read_exact(&mut table)?;

        let layout = FormatLayout::for_version(version);
        let raw_entries = match compact_format {
            Some(format) => {
                let offsets: Vec<u64> = words(&table)
                    .map(|word| u64::from(word & COMPACT_OFFSET_MASK) * u64::from(alignment))
                    .collect();
                let lengths = derive_compact_lengths(&offsets, play_region_length)?;
                offsets
                    .into_iter()
                    .zip(lengths)
                    .map(|(offset, length)| RawEntry {
                        flags_and_duration: 0,
                        format,
                        offset,
                        length,
                        loop_start: 0,
                        loop_length: 0,
                    })
                    .collect()
            }
            None => table
                .chunks_exact(entry_stride as usize)
                .map(|record| read_explicit_entry(version, record))
                .collect::<Vec<_>>(),
        };

        let names = if flags.contains(BankFlags::ENTRY_NAMES)
            && !names_segment.is_empty()
            && entry_name_size > 0
        {
            read_entry_names(reader, names_segment, entry_count, entry_name_size)?
        } else {
            Vec::new()
        };

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (index, raw) in raw_entries.into_iter().enumerate() {
            let entry = build_entry(
                index as u32,
                raw,
                layout,
                names.get(index).cloned(),
                play_region_offset,
                file_len,
            )?;
            entries.push(entry);
        }

        debug!(
            version,
            name,
            entries = entries.len(),
            compact = flags.is_compact(),
            play_region_offset,
            "Parsed bank header"
        );

        Ok(BankContainer {
            version,
            flags,
            name,
            alignment,
            entries,
            play_region_offset,
            play_region_length,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn flags(&self) -> BankFlags {
        self.flags
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    pub fn entries(&self) -> &[TrackEntry] {
        &self.entries
    }

    pub fn entry(&self, index: u32) -> Option<&TrackEntry> {
        self.entries.get(index as usize)
    }

    /// Finds an entry by its name, if the bank carries entry names.
    pub fn find(&self, name: &str) -> Option<&TrackEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.as_deref() == Some(name))
    }

    pub fn track_count(&self) -> usize {
        self.entries.len()
    }

    pub fn play_region_offset(&self) -> u64 {
        self.play_region_offset
    }

    pub fn play_region_length(&self) -> u64 {
        self.play_region_length
    }

    /// Absolute file offset of an entry's payload.
    pub fn payload_offset(&self, entry: &TrackEntry) -> u64 {
        self.play_region_offset + entry.file_offset
    }
}

fn words(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

fn read_explicit_entry(version: u32, record: &[u8]) -> RawEntry {
    let fields: Vec<u32> = words(record).collect();
    let field = |index: usize| fields.get(index).copied().unwrap_or(0);

    if version == 1 {
        RawEntry {
            flags_and_duration: 0,
            format: field(0),
            offset: u64::from(field(1)),
            length: u64::from(field(2)),
            loop_start: field(3),
            loop_length: field(4),
        }
    } else {
        RawEntry {
            flags_and_duration: field(0),
            format: field(1),
            offset: u64::from(field(2)),
            length: u64::from(field(3)),
            loop_start: field(4),
            loop_length: field(5),
        }
    }
}

/// Compact entries only store where each payload starts. Each length runs to
/// the next entry's start, the last one to the end of the play region.
pub(crate) fn derive_compact_lengths(
    offsets: &[u64],
    region_length: u64,
) -> Result<Vec<u64>, EngineError> {
    let mut lengths = Vec::with_capacity(offsets.len());
    for (index, &offset) in offsets.iter().enumerate() {
        let next = offsets.get(index + 1).copied().unwrap_or(region_length);
        if next < offset {
            return Err(EngineError::corrupt(format!(
                "compact entry {index} starts at {offset}, after the next entry at {next}"
            )));
        }
        lengths.push(next - offset);
    }
    Ok(lengths)
}

fn build_entry(
    index: u32,
    raw: RawEntry,
    layout: FormatLayout,
    name: Option<String>,
    play_region_offset: u64,
    file_len: u64,
) -> Result<TrackEntry, EngineError> {
    let format = layout.decode(raw.format);

    let start = play_region_offset + raw.offset;
    if start + raw.length > file_len {
        return Err(EngineError::corrupt(format!(
            "entry {index} payload ({}+{} in play region) extends past end of file \
             ({file_len} bytes)",
            raw.offset, raw.length
        )));
    }

    let duration = raw.flags_and_duration >> 4;
    let total_samples = if duration > 0 {
        u64::from(duration)
    } else {
        format.frames_in(raw.length)
    };

    let entry = TrackEntry {
        index,
        name,
        flags: raw.flags_and_duration & 0xf,
        format,
        file_offset: raw.offset,
        file_length: raw.length,
        loop_start: raw.loop_start,
        loop_length: raw.loop_length,
        total_samples,
    };

    if !entry.is_placeholder() && (format.channels == 0 || format.sample_rate == 0) {
        return Err(EngineError::corrupt(format!(
            "entry {index} has an empty format ({} channels, {} Hz)",
            format.channels, format.sample_rate
        )));
    }
    if entry.has_loop_region()
        && u64::from(entry.loop_start) + u64::from(entry.loop_length) > entry.total_samples
    {
        return Err(EngineError::corrupt(format!(
            "entry {index} loop region {}+{} exceeds {} samples",
            entry.loop_start, entry.loop_length, entry.total_samples
        )));
    }

    Ok(entry)
}

fn read_entry_names<R: Read + Seek>(
    reader: &mut R,
    segment: Segment,
    entry_count: u32,
    name_size: u32,
) -> Result<Vec<String>, EngineError> {
    let wanted = u64::from(entry_count) * u64::from(name_size);
    if wanted > u64::from(segment.length) {
        return Err(EngineError::corrupt(format!(
            "entry name table needs {wanted} bytes, segment holds {}",
            segment.length
        )));
    }

    reader.seek(SeekFrom::Start(u64::from(segment.offset)))?;
    let mut names = vec![0u8; wanted as usize];
    reader.read_exact(&mut names)?;
    Ok(names.chunks_exact(name_size as usize).map(trim_name).collect())
}

fn trim_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn read_header_bytes<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), EngineError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => FormatError::Truncated(what).into(),
        _ => EngineError::Io(e),
    })
}

fn read_header_u32<R: Read>(reader: &mut R, what: &'static str) -> Result<u32, EngineError> {
    let mut buf = [0u8; 4];
    read_header_bytes(reader, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}
