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

//! Wave banks: container parsing, track formats and the two ways of holding
//! track audio (resident or streamed).

use std::{fmt, sync::Arc};

use tracing::{info, span, Level};

use crate::codec::PcmDecoder;
use crate::error::EngineError;

mod format;
mod header;
mod resident;
mod source;
#[cfg(test)]
mod tests;

pub use format::{Codec, FormatLayout, PcmFormat, TrackFormat};
pub use header::{
    BankContainer, BankFlags, Segment, TrackEntry, BANK_MAGIC, MAX_BANK_VERSION,
};
pub use resident::{DecodedAudioBuffer, ResidentBank, ResidentBankLoader};
pub use source::{
    FileOpener, MemoryOpener, ReadSeek, SequentialOpener, SourceOpener, StreamSource,
};

/// How track audio is held once a bank is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Decode every track up front.
    Resident,
    /// Decode on demand, one producer thread per playing instance.
    Streaming,
    /// Follow the bank's own streaming flag.
    #[default]
    Auto,
}

/// Identifies an open bank within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BankId(pub(crate) u64);

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank-{}", self.0)
    }
}

/// Names a track by index or by entry name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackRef<'a> {
    Index(u32),
    Name(&'a str),
}

impl From<u32> for TrackRef<'_> {
    fn from(index: u32) -> Self {
        TrackRef::Index(index)
    }
}

impl<'a> From<&'a str> for TrackRef<'a> {
    fn from(name: &'a str) -> Self {
        TrackRef::Name(name)
    }
}

impl fmt::Display for TrackRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRef::Index(index) => write!(f, "#{index}"),
            TrackRef::Name(name) => write!(f, "{name:?}"),
        }
    }
}

enum BankContent {
    Resident(ResidentBank),
    Streaming(Arc<dyn SourceOpener>),
}

/// An open bank.
pub struct Bank {
    id: BankId,
    container: Arc<BankContainer>,
    content: BankContent,
}

impl Bank {
    /// Parses the bank behind `opener` and, unless it is to be streamed,
    /// loads every track.
    pub fn open(
        id: BankId,
        opener: Arc<dyn SourceOpener>,
        mode: LoadMode,
        decoder: &dyn PcmDecoder,
        pool: &rayon::ThreadPool,
    ) -> Result<Bank, EngineError> {
        let span = span!(Level::INFO, "open bank", source = opener.describe());
        let _enter = span.enter();

        let mut reader = opener.open()?.into_seekable()?;
        let container = BankContainer::parse(&mut reader)?;
        let streaming = match mode {
            LoadMode::Resident => false,
            LoadMode::Streaming => true,
            LoadMode::Auto => container.flags().is_streaming(),
        };

        let content = if streaming {
            BankContent::Streaming(opener)
        } else {
            BankContent::Resident(
                ResidentBankLoader::new(decoder, pool).load(&container, &mut reader),
            )
        };

        info!(
            bank = %id,
            name = container.name(),
            version = container.version(),
            tracks = container.track_count(),
            streaming,
            "Opened bank"
        );
        Ok(Bank {
            id,
            container: Arc::new(container),
            content,
        })
    }

    pub fn id(&self) -> BankId {
        self.id
    }

    pub fn container(&self) -> &Arc<BankContainer> {
        &self.container
    }

    pub fn name(&self) -> &str {
        self.container.name()
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.content, BankContent::Streaming(_))
    }

    /// Looks up a track's entry.
    pub fn resolve(&self, track: TrackRef<'_>) -> Result<&TrackEntry, EngineError> {
        let entry = match track {
            TrackRef::Index(index) => self.container.entry(index),
            TrackRef::Name(name) => self.container.find(name),
        };
        entry.ok_or_else(|| EngineError::UnknownTrack(track.to_string()))
    }

    /// Returns the decoded audio of a track in a resident bank.
    pub fn resident_track(
        &self,
        index: u32,
    ) -> Option<Result<Arc<DecodedAudioBuffer>, EngineError>> {
        match &self.content {
            BankContent::Resident(resident) => Some(resident.track(index)),
            BankContent::Streaming(_) => None,
        }
    }

    /// Returns the opener of a streaming bank.
    pub fn opener(&self) -> Option<&Arc<dyn SourceOpener>> {
        match &self.content {
            BankContent::Streaming(opener) => Some(opener),
            BankContent::Resident(_) => None,
        }
    }

    /// Tracks of a resident bank that failed to load.
    pub fn failures(&self) -> Vec<(u32, String)> {
        match &self.content {
            BankContent::Resident(resident) => resident
                .failures()
                .map(|(index, reason)| (index, reason.to_string()))
                .collect(),
            BankContent::Streaming(_) => Vec::new(),
        }
    }
}

impl fmt::Debug for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bank")
            .field("id", &self.id)
            .field("name", &self.container.name())
            .field("tracks", &self.container.track_count())
            .field("streaming", &self.is_streaming())
            .finish()
    }
}
