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

//! Byte sources a bank is read from: files, memory, and one-shot streams that
//! can only be read forward.

use std::{
    fs::File,
    io::{self, BufReader, Cursor, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
};

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// An open bank byte stream.
pub enum StreamSource {
    Seekable(Box<dyn ReadSeek>),
    /// A stream that can only be read forward, such as a pipe.
    Sequential(Box<dyn Read + Send>),
}

impl StreamSource {
    /// Reads `length` bytes starting at `offset`. Sequential sources skip
    /// forward by reading and discarding.
    pub fn read_range(self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        match self {
            StreamSource::Seekable(mut reader) => {
                reader.seek(SeekFrom::Start(offset))?;
                read_exact_len(&mut reader, length)
            }
            StreamSource::Sequential(mut reader) => {
                let skipped = io::copy(&mut reader.by_ref().take(offset), &mut io::sink())?;
                if skipped < offset {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("stream ended after {skipped} of {offset} bytes while skipping"),
                    ));
                }
                read_exact_len(&mut reader, length)
            }
        }
    }

    /// Makes the source seekable, buffering a sequential stream in memory.
    pub fn into_seekable(self) -> io::Result<Box<dyn ReadSeek>> {
        match self {
            StreamSource::Seekable(reader) => Ok(reader),
            StreamSource::Sequential(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(Box::new(Cursor::new(bytes)))
            }
        }
    }
}

fn read_exact_len<R: Read + ?Sized>(reader: &mut R, length: u64) -> io::Result<Vec<u8>> {
    let length = usize::try_from(length)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;
    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Opens a fresh stream over a bank each time it is called. Streaming
/// sessions open their own stream so they never share a read position.
pub trait SourceOpener: Send + Sync {
    fn open(&self) -> io::Result<StreamSource>;

    /// A short description for logs.
    fn describe(&self) -> String;
}

/// Opens a bank file on disk.
#[derive(Debug, Clone)]
pub struct FileOpener {
    path: PathBuf,
}

impl FileOpener {
    pub fn new(path: &Path) -> Self {
        FileOpener {
            path: path.to_path_buf(),
        }
    }
}

impl SourceOpener for FileOpener {
    fn open(&self) -> io::Result<StreamSource> {
        Ok(StreamSource::Seekable(Box::new(BufReader::new(File::open(
            &self.path,
        )?))))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Serves a bank image already in memory.
#[derive(Debug, Clone)]
pub struct MemoryOpener {
    bytes: Arc<[u8]>,
}

impl MemoryOpener {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        MemoryOpener {
            bytes: bytes.into(),
        }
    }
}

impl SourceOpener for MemoryOpener {
    fn open(&self) -> io::Result<StreamSource> {
        Ok(StreamSource::Seekable(Box::new(Cursor::new(
            self.bytes.clone(),
        ))))
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.bytes.len())
    }
}

/// Wraps a function producing forward-only streams.
pub struct SequentialOpener<F> {
    open: F,
}

impl<F> SequentialOpener<F>
where
    F: Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync,
{
    pub fn new(open: F) -> Self {
        SequentialOpener { open }
    }
}

impl<F> SourceOpener for SequentialOpener<F>
where
    F: Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync,
{
    fn open(&self) -> io::Result<StreamSource> {
        Ok(StreamSource::Sequential((self.open)()?))
    }

    fn describe(&self) -> String {
        "sequential stream".to_string()
    }
}
