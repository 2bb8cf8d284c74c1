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
use std::io::Cursor;
use std::sync::Arc;

use super::*;
use crate::codec::SymphoniaDecoder;
use crate::error::FormatError;
use crate::testutil::{pcm16_bytes, BankBuilder, FixtureTrack};

fn pool() -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .build()
        .unwrap()
}

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| (i as i16).wrapping_mul(97)).collect()
}

fn two_stereo_tracks() -> BankBuilder {
    BankBuilder::new(46)
        .track(FixtureTrack::pcm16(2, 44100, &ramp(200)))
        .track(FixtureTrack::pcm16(2, 44100, &ramp(120)))
}

#[test]
fn test_explicit_and_compact_agree() {
    let explicit = BankContainer::from_bytes(&two_stereo_tracks().build()).unwrap();
    let compact = BankContainer::from_bytes(&two_stereo_tracks().compact().build()).unwrap();

    assert!(!explicit.flags().is_compact());
    assert!(compact.flags().is_compact());
    assert_eq!(explicit.track_count(), compact.track_count());
    for (a, b) in explicit.entries().iter().zip(compact.entries()) {
        assert_eq!(a.format.codec, b.format.codec);
        assert_eq!(a.format.channels, b.format.channels);
        assert_eq!(a.format.sample_rate, b.format.sample_rate);
        assert_eq!(a.file_offset, b.file_offset);
        assert_eq!(a.file_length, b.file_length);
        assert_eq!(a.total_samples, b.total_samples);
    }
    assert_eq!(compact.entries()[0].file_length, 400);
    assert_eq!(compact.entries()[1].total_samples, 60);
}

#[test]
fn test_legacy_version_computes_play_region() {
    let samples = ramp(32);
    let bytes = BankBuilder::new(1)
        .track(FixtureTrack::pcm16(1, 22050, &samples))
        .track(FixtureTrack::pcm16(1, 22050, &samples[..16]))
        .build();
    let container = BankContainer::from_bytes(&bytes).unwrap();

    // Header (8) + four segments (32) + flags/count (8) + name (64) + 2 x 20 byte entries.
    assert_eq!(container.play_region_offset(), 40 + 8 + 64 + 40);
    assert_eq!(container.version(), 1);

    let entry = container.entry(1).unwrap();
    assert_eq!(entry.format.channels, 1);
    assert_eq!(entry.format.sample_rate, 22050);
    assert_eq!(entry.total_samples, 16);
    let start = container.payload_offset(entry) as usize;
    assert_eq!(
        &bytes[start..start + entry.file_length as usize],
        pcm16_bytes(&samples[..16]).as_slice()
    );
}

#[test]
fn test_legacy_version_ignores_play_segment() {
    let samples = ramp(32);
    let bytes = BankBuilder::new(1)
        .legacy_play_segment(40, 16)
        .track(FixtureTrack::pcm16(1, 22050, &samples))
        .build();
    let container = BankContainer::from_bytes(&bytes).unwrap();
    assert_eq!(container.play_region_offset(), 40 + 8 + 64 + 20);
    assert_eq!(container.play_region_length(), 64);

    let pool = pool();
    let bank = Bank::open(
        BankId(1),
        Arc::new(MemoryOpener::new(bytes)),
        LoadMode::Resident,
        &SymphoniaDecoder,
        &pool,
    )
    .unwrap();
    let track = bank.resident_track(0).unwrap().unwrap();
    assert_eq!(track.data(), pcm16_bytes(&samples).as_slice());
}

#[test]
fn test_short_bank_name_versions() {
    let bytes = BankBuilder::new(3)
        .name("a-longer-bank-name")
        .track(FixtureTrack::pcm16(1, 8000, &ramp(8)))
        .build();
    let container = BankContainer::from_bytes(&bytes).unwrap();
    // Versions 2 and 3 only have room for 16 bytes.
    assert_eq!(container.name(), "a-longer-bank-na");
    assert_eq!(container.entry(0).unwrap().total_samples, 8);
}

#[test]
fn test_header_version_word() {
    for version in [41, 42, 46] {
        let bytes = BankBuilder::new(version)
            .name("sfx")
            .track(FixtureTrack::pcm16(1, 8000, &ramp(8)))
            .build();
        let container = BankContainer::from_bytes(&bytes).unwrap();
        assert_eq!(container.version(), version);
        assert_eq!(container.name(), "sfx");
        assert_eq!(container.entry(0).unwrap().file_length, 16);
    }
}

#[test]
fn test_entry_names() {
    let bytes = BankBuilder::new(46)
        .track(FixtureTrack::pcm16(1, 8000, &ramp(8)).named("kick"))
        .track(FixtureTrack::pcm16(1, 8000, &ramp(8)).named("snare"))
        .build();
    let container = BankContainer::from_bytes(&bytes).unwrap();
    assert!(container.flags().contains(BankFlags::ENTRY_NAMES));
    assert_eq!(container.find("snare").map(|e| e.index), Some(1));
    assert_eq!(container.entry(0).unwrap().name.as_deref(), Some("kick"));
    assert!(container.find("hat").is_none());
}

#[test]
fn test_duration_and_loop_fields() {
    let bytes = BankBuilder::new(46)
        .track(
            FixtureTrack::pcm16(1, 8000, &ramp(100))
                .with_duration(90)
                .with_loop(10, 80),
        )
        .build();
    let container = BankContainer::from_bytes(&bytes).unwrap();
    let entry = container.entry(0).unwrap();
    assert_eq!(entry.total_samples, 90);
    assert_eq!((entry.loop_start, entry.loop_length), (10, 80));
    assert!(entry.has_loop_region());
}

#[test]
fn test_loop_region_past_end_is_corrupt() {
    let bytes = BankBuilder::new(46)
        .track(FixtureTrack::pcm16(1, 8000, &ramp(100)).with_loop(50, 51))
        .build();
    assert!(matches!(
        BankContainer::from_bytes(&bytes),
        Err(EngineError::CorruptContainer(_))
    ));
}

#[test]
fn test_entry_offset_past_eof_is_corrupt() {
    let bytes = two_stereo_tracks().entry_offset(1, 0x00ff_fff0).build();
    let result = BankContainer::from_bytes(&bytes);
    assert!(
        matches!(result, Err(EngineError::CorruptContainer(ref msg)) if msg.contains("entry 1")),
        "{result:?}"
    );
}

#[test]
fn test_decreasing_compact_offsets_are_corrupt() {
    let bytes = two_stereo_tracks().compact().entry_offset(0, 800).build();
    assert!(matches!(
        BankContainer::from_bytes(&bytes),
        Err(EngineError::CorruptContainer(_))
    ));
}

#[test]
fn test_truncated_file_is_corrupt() {
    let bytes = two_stereo_tracks().build();
    let result = BankContainer::from_bytes(&bytes[..bytes.len() - 10]);
    assert!(matches!(result, Err(EngineError::CorruptContainer(_))));
}

#[test]
fn test_bad_magic() {
    let mut bytes = two_stereo_tracks().build();
    bytes[..4].copy_from_slice(b"RIFF");
    assert!(matches!(
        BankContainer::from_bytes(&bytes),
        Err(EngineError::Format(FormatError::BadMagic(magic))) if &magic == b"RIFF"
    ));
}

#[test]
fn test_unsupported_versions() {
    for version in [0, MAX_BANK_VERSION + 1] {
        let mut bytes = two_stereo_tracks().build();
        bytes[4..8].copy_from_slice(&version.to_le_bytes());
        assert!(matches!(
            BankContainer::from_bytes(&bytes),
            Err(EngineError::Format(FormatError::UnsupportedVersion(v))) if v == version
        ));
    }
}

#[test]
fn test_truncated_header() {
    let bytes = two_stereo_tracks().build();
    assert!(matches!(
        BankContainer::from_bytes(&bytes[..6]),
        Err(EngineError::Format(FormatError::Truncated("version")))
    ));
}

#[test]
fn test_resident_load_ms_adpcm() {
    let bytes = BankBuilder::new(46)
        .track(FixtureTrack::ms(1, 22050, 48, 2, 900))
        .track(FixtureTrack::ms(2, 44100, 48, 3, -64).with_duration(300))
        .build();
    let container = BankContainer::from_bytes(&bytes).unwrap();
    assert_eq!(container.entry(0).unwrap().format.codec, Codec::MsAdpcm);
    assert_eq!(container.entry(0).unwrap().total_samples, 256);

    let pool = pool();
    let loader = ResidentBankLoader::new(&SymphoniaDecoder, &pool);
    let resident = loader.load(&container, &mut Cursor::new(&bytes));
    assert_eq!(resident.failures().count(), 0);

    let mono = resident.track(0).unwrap();
    assert_eq!(mono.frames(), 256);
    assert!(mono
        .data()
        .chunks_exact(2)
        .all(|b| i16::from_le_bytes([b[0], b[1]]) == 900));

    // Three 128 frame blocks, cut to 300.
    let stereo = resident.track(1).unwrap();
    assert_eq!(stereo.frames(), 300);
    assert_eq!(stereo.data().len(), 300 * 4);
}

#[test]
fn test_resident_load_decodes_every_track() {
    let samples = ramp(64);
    let bytes = BankBuilder::new(46)
        .track(FixtureTrack::pcm16(1, 8000, &samples))
        .track(FixtureTrack::ima(2, 22050, 14, 3, -1200).with_duration(150))
        .track(FixtureTrack::placeholder())
        .track(FixtureTrack::pcm16(1, 8000, &samples).with_codec(Codec::Xma))
        .build();
    let container = BankContainer::from_bytes(&bytes).unwrap();
    let pool = pool();
    let loader = ResidentBankLoader::new(&SymphoniaDecoder, &pool);
    let resident = loader.load(&container, &mut Cursor::new(&bytes));

    let pcm = resident.track(0).unwrap();
    assert_eq!(pcm.data(), pcm16_bytes(&samples).as_slice());
    assert_eq!(pcm.frames(), 64);

    // Three 65 frame blocks, cut to the entry's 150 sample duration.
    let ima = resident.track(1).unwrap();
    assert_eq!(ima.frames(), 150);
    assert_eq!(ima.format().channels, 2);
    assert_eq!(ima.data().len(), 150 * 4);
    assert!(ima
        .data()
        .chunks_exact(2)
        .all(|b| i16::from_le_bytes([b[0], b[1]]) == -1200));

    assert!(matches!(
        resident.track(2),
        Err(EngineError::TrackLoad { track: 2, .. })
    ));
    assert!(matches!(
        resident.track(3),
        Err(EngineError::TrackLoad { track: 3, .. })
    ));
    assert_eq!(resident.failures().count(), 2);
}

#[test]
fn test_resident_short_read_only_fails_that_track() {
    let bytes = two_stereo_tracks().build();
    let container = BankContainer::from_bytes(&bytes).unwrap();

    // The file shrank after the header was read.
    let shrunk = &bytes[..bytes.len() - 8];
    let pool = pool();
    let resident = ResidentBankLoader::new(&SymphoniaDecoder, &pool)
        .load(&container, &mut Cursor::new(shrunk));

    assert!(resident.track(0).is_ok());
    match resident.track(1) {
        Err(EngineError::TrackLoad { track, reason }) => {
            assert_eq!(track, 1);
            assert!(reason.contains("short read"), "{reason}");
        }
        other => panic!("expected a track load error, got {other:?}"),
    }
}

#[test]
fn test_open_bank_modes() {
    let bytes: Arc<[u8]> = two_stereo_tracks().streaming().build().into();
    let pool = pool();
    let opener: Arc<dyn SourceOpener> = Arc::new(MemoryOpener::new(bytes.clone()));

    let auto = Bank::open(
        BankId(1),
        opener.clone(),
        LoadMode::Auto,
        &SymphoniaDecoder,
        &pool,
    )
    .unwrap();
    assert!(auto.is_streaming());
    assert!(auto.opener().is_some());
    assert!(auto.resident_track(0).is_none());

    let resident =
        Bank::open(BankId(2), opener, LoadMode::Resident, &SymphoniaDecoder, &pool).unwrap();
    assert!(!resident.is_streaming());
    assert_eq!(resident.resident_track(1).unwrap().unwrap().frames(), 60);
    assert!(resident.failures().is_empty());
}

#[test]
fn test_open_bank_from_file_and_sequential_source() {
    let bytes = two_stereo_tracks().build();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.wbnd");
    std::fs::write(&path, &bytes).unwrap();
    let pool = pool();

    let from_file = Bank::open(
        BankId(1),
        Arc::new(FileOpener::new(&path)),
        LoadMode::Resident,
        &SymphoniaDecoder,
        &pool,
    )
    .unwrap();
    assert_eq!(from_file.resident_track(0).unwrap().unwrap().frames(), 100);

    let sequential = SequentialOpener::new(move || {
        Ok(Box::new(Cursor::new(bytes.clone())) as Box<dyn std::io::Read + Send>)
    });
    let from_pipe = Bank::open(
        BankId(2),
        Arc::new(sequential),
        LoadMode::Resident,
        &SymphoniaDecoder,
        &pool,
    )
    .unwrap();
    assert_eq!(from_pipe.resident_track(1).unwrap().unwrap().frames(), 60);
}

#[test]
fn test_resolve_tracks() {
    let bytes = BankBuilder::new(46)
        .track(FixtureTrack::pcm16(1, 8000, &ramp(8)).named("kick"))
        .build();
    let pool = pool();
    let bank = Bank::open(
        BankId(1),
        Arc::new(MemoryOpener::new(bytes)),
        LoadMode::Resident,
        &SymphoniaDecoder,
        &pool,
    )
    .unwrap();

    assert_eq!(bank.resolve("kick".into()).unwrap().index, 0);
    assert_eq!(bank.resolve(TrackRef::Index(0)).unwrap().name.as_deref(), Some("kick"));
    assert!(matches!(
        bank.resolve("snare".into()),
        Err(EngineError::UnknownTrack(_))
    ));
    assert!(matches!(
        bank.resolve(TrackRef::Index(3)),
        Err(EngineError::UnknownTrack(_))
    ));
}
