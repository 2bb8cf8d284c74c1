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
    fmt,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::bank::{
    Bank, BankId, DecodedAudioBuffer, FileOpener, LoadMode, MemoryOpener, SourceOpener,
    TrackEntry, TrackRef,
};
use crate::codec::{PcmDecoder, SymphoniaDecoder};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::{EventSink, PlaybackEvent};
use crate::instance::{
    AssetId, InstanceId, InstancePool, LoopCount, Playback, PlaybackInstance, ResidentPlayback,
};
use crate::stream::{SessionRequest, StreamSettings, StreamingSession};
use crate::voice::{self, HardwareVoicePool, VoiceBackend, VoiceHandle, VoiceParams};

/// How often the mock device's clock advances its voices.
const MOCK_CLOCK_TICK: Duration = Duration::from_millis(10);

/// Settings for one playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    pub volume: f32,
    pub pan: f32,
    pub pitch: f32,
    pub loop_count: LoopCount,
}

impl PlayParams {
    fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            volume: self.volume,
            pan: self.pan,
            pitch: self.pitch,
        }
    }
}

impl Default for PlayParams {
    fn default() -> Self {
        let voice = VoiceParams::default();
        PlayParams {
            volume: voice.volume,
            pan: voice.pan,
            pitch: voice.pitch,
            loop_count: LoopCount::default(),
        }
    }
}

/// Where a playback's audio comes from.
enum PlaybackSource {
    Resident(Arc<DecodedAudioBuffer>),
    Streaming {
        opener: Arc<dyn SourceOpener>,
        payload_offset: u64,
    },
}

/// Plays tracks from wave banks on a fixed set of voices.
pub struct AudioEngine {
    backend: Arc<dyn VoiceBackend>,
    voices: HardwareVoicePool,
    instances: InstancePool,
    decoder: Arc<dyn PcmDecoder>,
    decode_pool: rayon::ThreadPool,
    stream_settings: StreamSettings,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
    next_bank: AtomicU64,
}

impl AudioEngine {
    /// Creates an engine that plays through `backend`.
    pub fn new(config: &EngineConfig, backend: Arc<dyn VoiceBackend>) -> Result<Self, EngineError> {
        let decode_pool = ThreadPoolBuilder::new()
            .num_threads(config.decode_threads())
            .thread_name(|i| format!("wavebank-decode-{i}"))
            .build()?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        info!(
            device = %backend.name(),
            voices = config.max_voices(),
            max_playing = config.max_playing_instances(),
            decode_threads = config.decode_threads(),
            "Audio engine started"
        );
        Ok(AudioEngine {
            voices: HardwareVoicePool::new(backend.clone(), config.max_voices()),
            instances: InstancePool::new(config.max_playing_instances()),
            backend,
            decoder: Arc::new(SymphoniaDecoder::new()),
            decode_pool,
            stream_settings: StreamSettings::from_config(config),
            events_tx,
            events_rx,
            next_bank: AtomicU64::new(1),
        })
    }

    /// Creates an engine on the configured device: "mock" for a silent
    /// real-time back-end, anything else names a cpal output device.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let backend: Arc<dyn VoiceBackend> = match config.device() {
            "mock" => voice::mock::Backend::with_clock("mock", MOCK_CLOCK_TICK),
            name => Arc::new(voice::cpal::Backend::open(name)?),
        };
        AudioEngine::new(config, backend)
    }

    /// Replaces the decode primitive used for banks opened from now on.
    pub fn with_decoder(mut self, decoder: Arc<dyn PcmDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn open_bank(&self, path: &Path, mode: LoadMode) -> Result<Bank, EngineError> {
        self.open_bank_from(Arc::new(FileOpener::new(path)), mode)
    }

    pub fn open_bank_bytes(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        mode: LoadMode,
    ) -> Result<Bank, EngineError> {
        self.open_bank_from(Arc::new(MemoryOpener::new(bytes)), mode)
    }

    pub fn open_bank_from(
        &self,
        opener: Arc<dyn SourceOpener>,
        mode: LoadMode,
    ) -> Result<Bank, EngineError> {
        let id = BankId(self.next_bank.fetch_add(1, Ordering::Relaxed));
        Bank::open(id, opener, mode, self.decoder.as_ref(), &self.decode_pool)
    }

    /// Plays a track on a pooled instance. The instance returns to the pool
    /// when it is stopped or reclaimed by `update`.
    pub fn play(
        &self,
        bank: &Bank,
        track: TrackRef<'_>,
        params: PlayParams,
    ) -> Result<InstanceId, EngineError> {
        let instance = self.instances.acquire(bank.is_streaming());
        match self.start(&instance, bank, track, params) {
            Ok(()) => Ok(instance.id()),
            Err(e) => {
                self.instances.release(&instance);
                Err(e)
            }
        }
    }

    /// Creates an instance owned by the caller, to be started with `start`.
    pub fn create_instance(&self) -> Arc<PlaybackInstance> {
        self.instances.create()
    }

    /// Starts `track` on `instance`, stopping whatever it was playing.
    pub fn start(
        &self,
        instance: &Arc<PlaybackInstance>,
        bank: &Bank,
        track: TrackRef<'_>,
        params: PlayParams,
    ) -> Result<(), EngineError> {
        if instance.is_disposed() {
            return Err(EngineError::Disposed);
        }
        // A handle kept from `play` or `find` after the instance was stopped.
        if instance.is_free() {
            return Err(EngineError::Released);
        }
        let entry = bank.resolve(track)?;
        if entry.is_placeholder() {
            return Err(EngineError::TrackLoad {
                track: entry.index,
                reason: "placeholder entry has no audio".to_string(),
            });
        }
        let source = match bank.resident_track(entry.index) {
            Some(buffer) => PlaybackSource::Resident(buffer?),
            None => {
                self.decoder
                    .supports(&entry.format)
                    .map_err(|e| EngineError::UnsupportedCodec {
                        track: entry.index,
                        reason: e.to_string(),
                    })?;
                let Some(opener) = bank.opener() else {
                    return Err(EngineError::TrackLoad {
                        track: entry.index,
                        reason: "bank has no stream source".to_string(),
                    });
                };
                PlaybackSource::Streaming {
                    opener: opener.clone(),
                    payload_offset: bank.container().payload_offset(entry),
                }
            }
        };

        // Restarting an instance drops its previous playback.
        self.halt(instance);

        let asset = AssetId {
            bank: bank.id(),
            track: entry.index,
        };
        instance.bind_asset(asset, params.voice_params(), params.loop_count);
        self.instances.mark_playing(instance)?;
        let voice = match self.voices.reserve() {
            Ok(voice) => voice,
            Err(e) => {
                self.instances.unmark_playing(instance.id());
                return Err(e.into());
            }
        };

        match self.bind(instance, voice, asset, entry, source, params) {
            Ok(playback) => {
                instance.attach(voice, playback);
                debug!(
                    instance = %instance.id(),
                    asset = %asset,
                    voice = %voice,
                    "Started playback"
                );
                Ok(())
            }
            Err(e) => {
                self.voices.release(voice);
                self.instances.unmark_playing(instance.id());
                warn!(
                    instance = %instance.id(),
                    asset = %asset,
                    err = %e,
                    "Playback failed to start"
                );
                Err(e)
            }
        }
    }

    fn bind(
        &self,
        instance: &PlaybackInstance,
        voice: VoiceHandle,
        asset: AssetId,
        entry: &TrackEntry,
        source: PlaybackSource,
        params: PlayParams,
    ) -> Result<Playback, EngineError> {
        let index = voice.index();
        let events = EventSink::new(self.events_tx.clone(), instance.id(), asset);

        let playback = match source {
            PlaybackSource::Resident(buffer) => {
                self.backend.configure(index, buffer.format())?;
                let resident = Arc::new(ResidentPlayback::new(
                    buffer,
                    self.backend.clone(),
                    index,
                    params.loop_count,
                    events,
                ));
                resident.prime()?;
                Playback::Resident(resident)
            }
            PlaybackSource::Streaming {
                opener,
                payload_offset,
            } => {
                self.backend.configure(index, entry.format.pcm_format())?;
                Playback::Streaming(StreamingSession::spawn(SessionRequest {
                    opener,
                    payload_offset,
                    entry: entry.clone(),
                    decoder: self.decoder.clone(),
                    loop_count: params.loop_count,
                    settings: self.stream_settings.clone(),
                    backend: self.backend.clone(),
                    voice: index,
                    events,
                })?)
            }
        };

        self.backend.set_params(index, params.voice_params());
        self.backend.set_buffer_needed(index, Some(playback.feeder()));
        self.backend.start(index)?;
        Ok(playback)
    }

    /// Detaches the voice and playback from an instance and tears them down.
    /// No instance or pool lock is held while the voice is released.
    fn halt(&self, instance: &PlaybackInstance) {
        let (voice, playback) = instance.detach();
        if let Some(playback) = &playback {
            playback.cancel();
        }
        if let Some(voice) = voice {
            self.backend.stop(voice.index());
            self.voices.release(voice);
        }
        drop(playback);
    }

    /// Stops an instance and releases it; pooled instances go back to the pool.
    pub fn stop(&self, instance: &Arc<PlaybackInstance>) {
        self.halt(instance);
        self.instances.release(instance);
    }

    pub fn pause(&self, instance: &PlaybackInstance) {
        if let Some(voice) = instance.set_paused(true) {
            self.backend.pause(voice.index());
        }
    }

    pub fn resume(&self, instance: &PlaybackInstance) {
        if let Some(voice) = instance.set_paused(false) {
            self.backend.resume(voice.index());
        }
    }

    pub fn set_volume(&self, instance: &PlaybackInstance, volume: f32) {
        self.update_params(instance, |params| params.volume = volume.max(0.0));
    }

    pub fn set_pan(&self, instance: &PlaybackInstance, pan: f32) {
        self.update_params(instance, |params| params.pan = pan.clamp(-1.0, 1.0));
    }

    pub fn set_pitch(&self, instance: &PlaybackInstance, pitch: f32) {
        self.update_params(instance, |params| params.pitch = pitch.max(0.0));
    }

    fn update_params(&self, instance: &PlaybackInstance, f: impl FnOnce(&mut VoiceParams)) {
        let (params, voice) = instance.update_params(f);
        if let Some(voice) = voice {
            self.backend.set_params(voice.index(), params);
        }
    }

    /// Stops the instance for good: its producer is signalled, its voice
    /// released, and it never returns to the free list. Safe to call from
    /// inside a voice callback.
    pub fn dispose(&self, instance: &Arc<PlaybackInstance>) {
        if !instance.mark_disposed() {
            return;
        }
        self.halt(instance);
        self.instances.release(instance);
        debug!(instance = %instance.id(), "Disposed instance");
    }

    /// Stops every playing instance of a track. Returns how many were stopped.
    pub fn stop_all_for_asset(&self, asset: AssetId) -> usize {
        self.instances
            .stop_all_for_asset(asset, |instance| self.halt(instance))
    }

    /// Reclaims instances whose playback ended on its own. Call periodically.
    pub fn update(&self) -> usize {
        let mut reclaimed = 0;
        for instance in self.instances.playing_snapshot() {
            if instance.is_done() {
                self.stop(&instance);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            debug!(reclaimed, "Reclaimed finished instances");
        }
        reclaimed
    }

    /// Looks up a playing instance.
    pub fn find(&self, id: InstanceId) -> Option<Arc<PlaybackInstance>> {
        self.instances.find(id)
    }

    pub fn playing_count(&self) -> usize {
        self.instances.playing_count()
    }

    pub fn free_voice_count(&self) -> usize {
        self.voices.free_count()
    }

    pub fn free_instance_count(&self) -> usize {
        self.instances.free_count()
    }

    /// Frames played so far by an instance's voice.
    pub fn position(&self, instance: &PlaybackInstance) -> u64 {
        instance
            .voice()
            .map_or(0, |voice| self.backend.sample_position(voice.index()))
    }

    /// Finished and failed playbacks, in the order they ended.
    pub fn events(&self) -> &Receiver<PlaybackEvent> {
        &self.events_rx
    }

    pub fn backend(&self) -> &Arc<dyn VoiceBackend> {
        &self.backend
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("device", &self.backend.name())
            .field("voices", &self.voices)
            .field("instances", &self.instances)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    use super::*;
    use crate::bank::Codec;
    use crate::event::PlaybackEventKind;
    use crate::instance::InstanceState;
    use crate::testutil::{eventually, pcm16_bytes, BankBuilder, FixtureTrack};
    use crate::voice::mock;

    fn mock_engine(config: EngineConfig) -> (Arc<mock::Backend>, AudioEngine) {
        let backend = Arc::new(mock::Backend::capturing());
        let engine = AudioEngine::new(&config.with_poll_interval("5ms"), backend.clone()).unwrap();
        (backend, engine)
    }

    fn samples(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i * 3) as i16).collect()
    }

    fn bank_bytes() -> Vec<u8> {
        BankBuilder::new(46)
            .track(FixtureTrack::pcm16(1, 8000, &samples(400)).named("kick"))
            .track(FixtureTrack::pcm16(2, 8000, &samples(800)).named("pad"))
            .track(FixtureTrack::placeholder().named("empty"))
            .track(FixtureTrack::pcm16(1, 8000, &samples(64)).with_codec(Codec::Xma).named("xma"))
            .build()
    }

    #[test]
    fn test_play_resident_to_completion() {
        let (backend, engine) = mock_engine(EngineConfig::new("mock").with_max_voices(4));
        let bank = engine.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();

        let id = engine
            .play(
                &bank,
                "kick".into(),
                PlayParams {
                    volume: 0.5,
                    loop_count: LoopCount::Finite(1),
                    ..PlayParams::default()
                },
            )
            .unwrap();
        let instance = engine.find(id).unwrap();
        let voice = instance.voice().unwrap();
        assert_eq!(instance.state(), InstanceState::Active);
        assert_eq!(backend.params(voice.index()).volume, 0.5);
        assert_eq!(engine.free_voice_count(), 3);
        assert_eq!(engine.playing_count(), 1);

        assert_eq!(backend.drain(voice.index()), 800);
        backend.consume(voice.index(), 1);
        assert_eq!(backend.captured(voice.index()), pcm16_bytes(&samples(400)).repeat(2));

        let event = engine.events().recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event.instance, id);
        assert_eq!(event.kind, PlaybackEventKind::Finished);

        assert_eq!(engine.update(), 1);
        assert_eq!(engine.playing_count(), 0);
        assert_eq!(engine.free_voice_count(), 4);
        assert_eq!(engine.free_instance_count(), 1);
        assert!(engine.find(id).is_none());
    }

    #[test]
    fn test_play_streaming_bank() {
        let (backend, engine) = mock_engine(EngineConfig::new("mock").with_chunk_frames(128));
        let bytes = BankBuilder::new(46)
            .streaming()
            .track(FixtureTrack::pcm16(2, 8000, &samples(800)))
            .build();
        let bank = engine.open_bank_bytes(bytes, LoadMode::Auto).unwrap();
        assert!(bank.is_streaming());

        let id = engine.play(&bank, TrackRef::Index(0), PlayParams::default()).unwrap();
        let instance = engine.find(id).unwrap();
        assert!(instance.is_exclusive());
        let voice = instance.voice().unwrap().index();

        eventually(
            || {
                backend.consume(voice, 64);
                instance.is_done()
            },
            "Streaming playback never finished",
        );
        assert_eq!(backend.captured(voice), pcm16_bytes(&samples(800)));
        assert_eq!(engine.update(), 1);
        assert_eq!(engine.playing_count(), 0);
    }

    #[test]
    fn test_play_errors() {
        let (_, engine) = mock_engine(EngineConfig::new("mock"));
        let bank = engine.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();

        assert!(matches!(
            engine.play(&bank, "empty".into(), PlayParams::default()),
            Err(EngineError::TrackLoad { track: 2, .. })
        ));
        assert!(matches!(
            engine.play(&bank, "xma".into(), PlayParams::default()),
            Err(EngineError::TrackLoad { track: 3, .. })
        ));
        assert!(matches!(
            engine.play(&bank, "missing".into(), PlayParams::default()),
            Err(EngineError::UnknownTrack(_))
        ));

        let streaming = engine.open_bank_bytes(bank_bytes(), LoadMode::Streaming).unwrap();
        assert!(matches!(
            engine.play(&streaming, "xma".into(), PlayParams::default()),
            Err(EngineError::UnsupportedCodec { track: 3, .. })
        ));

        // Failed requests leave nothing behind.
        assert_eq!(engine.playing_count(), 0);
        assert_eq!(engine.free_voice_count(), 256);
    }

    #[test]
    fn test_voice_exhaustion_and_instance_limit() {
        let (_, engine) = mock_engine(
            EngineConfig::new("mock")
                .with_max_voices(2)
                .with_max_playing_instances(8),
        );
        let bank = engine.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();

        engine.play(&bank, TrackRef::Index(0), PlayParams::default()).unwrap();
        engine.play(&bank, TrackRef::Index(0), PlayParams::default()).unwrap();
        assert!(matches!(
            engine.play(&bank, TrackRef::Index(0), PlayParams::default()),
            Err(EngineError::VoiceExhausted(_))
        ));
        assert_eq!(engine.playing_count(), 2);

        let (_, limited) = mock_engine(
            EngineConfig::new("mock")
                .with_max_voices(8)
                .with_max_playing_instances(1),
        );
        let bank = limited.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();
        limited.play(&bank, TrackRef::Index(0), PlayParams::default()).unwrap();
        assert!(matches!(
            limited.play(&bank, TrackRef::Index(0), PlayParams::default()),
            Err(EngineError::InstanceLimit(1))
        ));
        assert_eq!(limited.free_voice_count(), 7);
    }

    #[test]
    fn test_stopped_pooled_instance_cannot_be_restarted() {
        let (_, engine) = mock_engine(EngineConfig::new("mock"));
        let bank = engine.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();
        let id = engine.play(&bank, TrackRef::Index(0), PlayParams::default()).unwrap();
        let instance = engine.find(id).unwrap();

        engine.stop(&instance);
        assert!(matches!(
            engine.start(&instance, &bank, TrackRef::Index(0), PlayParams::default()),
            Err(EngineError::Released)
        ));
        assert_eq!(engine.free_instance_count(), 1);
        assert_eq!(engine.playing_count(), 0);
        assert_eq!(engine.free_voice_count(), 256);

        let again = engine.play(&bank, TrackRef::Index(0), PlayParams::default()).unwrap();
        let reused = engine.find(again).unwrap();
        assert!(Arc::ptr_eq(&instance, &reused));
        assert_eq!(engine.free_instance_count(), 0);
        assert_eq!(engine.playing_count(), 1);

        engine.stop(&reused);
        assert_eq!(engine.playing_count(), 0);
        assert_eq!(engine.free_instance_count(), 1);
    }

    #[test]
    fn test_dispose_mid_stream() {
        let poll_interval = Duration::from_secs(2);
        let backend = Arc::new(mock::Backend::capturing());
        let config = EngineConfig::new("mock")
            .with_chunk_frames(64)
            .with_poll_interval("2s");
        let engine = AudioEngine::new(&config, backend.clone()).unwrap();
        let bytes = BankBuilder::new(46)
            .track(FixtureTrack::pcm16(1, 8000, &samples(4000)))
            .build();
        let bank = engine.open_bank_bytes(bytes, LoadMode::Streaming).unwrap();
        let instance = engine.create_instance();
        engine
            .start(
                &instance,
                &bank,
                TrackRef::Index(0),
                PlayParams {
                    loop_count: LoopCount::Infinite,
                    ..PlayParams::default()
                },
            )
            .unwrap();
        let voice = instance.voice().unwrap().index();
        eventually(
            || backend.consume(voice, 32) > 0,
            "Nothing was streamed",
        );

        let session = instance.session().unwrap();
        assert!(session.is_producing());

        let free_before = engine.free_voice_count();
        let disposed_at = Instant::now();
        engine.dispose(&instance);
        assert_eq!(engine.free_voice_count(), free_before + 1);
        eventually(|| !session.is_producing(), "Producer never exited");
        assert!(disposed_at.elapsed() < poll_interval);
        assert!(instance.session().is_none());
        assert_eq!(instance.state(), InstanceState::Disposed);
        assert_eq!(engine.playing_count(), 0);
        assert_eq!(engine.free_instance_count(), 0);
        assert!(matches!(
            engine.start(&instance, &bank, TrackRef::Index(0), PlayParams::default()),
            Err(EngineError::Disposed)
        ));
    }

    #[test]
    fn test_dispose_from_inside_voice_callback() {
        let (backend, engine) = mock_engine(EngineConfig::new("mock"));
        let engine = Arc::new(engine);
        let bank = engine.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();
        let instance = engine.create_instance();
        engine
            .start(&instance, &bank, TrackRef::Index(0), PlayParams::default())
            .unwrap();
        let voice = instance.voice().unwrap().index();

        let disposed = Arc::new(AtomicBool::new(false));
        {
            let engine = engine.clone();
            let instance = instance.clone();
            let disposed = disposed.clone();
            backend.set_buffer_needed(
                voice,
                Some(Arc::new(move |_voice: usize| {
                    engine.dispose(&instance);
                    disposed.store(true, Ordering::SeqCst);
                })),
            );
        }

        backend.consume(voice, 1000);
        assert!(disposed.load(Ordering::SeqCst));
        assert!(instance.is_disposed());
        assert_eq!(engine.free_voice_count(), 256);
        assert!(!backend.has_buffer_needed(voice));
    }

    #[test]
    fn test_stop_all_for_asset() {
        let (_, engine) = mock_engine(EngineConfig::new("mock"));
        let bank = engine.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();
        let looping = PlayParams {
            loop_count: LoopCount::Infinite,
            ..PlayParams::default()
        };
        for _ in 0..3 {
            engine.play(&bank, "kick".into(), looping).unwrap();
        }
        let others: Vec<InstanceId> = (0..2)
            .map(|_| engine.play(&bank, "pad".into(), looping).unwrap())
            .collect();
        assert_eq!(engine.playing_count(), 5);

        let kick = AssetId {
            bank: bank.id(),
            track: 0,
        };
        assert_eq!(engine.stop_all_for_asset(kick), 3);
        assert_eq!(engine.playing_count(), 2);
        assert_eq!(engine.free_voice_count(), 254);
        assert_eq!(engine.free_instance_count(), 3);
        for id in others {
            let instance = engine.find(id).unwrap();
            assert_eq!(instance.state(), InstanceState::Active);
        }
    }

    #[test]
    fn test_pause_resume_and_params() {
        let (backend, engine) = mock_engine(EngineConfig::new("mock"));
        let bank = engine.open_bank_bytes(bank_bytes(), LoadMode::Resident).unwrap();
        let id = engine.play(&bank, TrackRef::Index(1), PlayParams::default()).unwrap();
        let instance = engine.find(id).unwrap();
        let voice = instance.voice().unwrap().index();

        engine.pause(&instance);
        assert_eq!(instance.state(), InstanceState::Paused);
        assert_eq!(backend.consume(voice, 10), 0);

        engine.resume(&instance);
        assert_eq!(instance.state(), InstanceState::Active);
        assert_eq!(backend.consume(voice, 10), 10);
        assert_eq!(engine.position(&instance), 10);

        engine.set_pan(&instance, -4.0);
        engine.set_pitch(&instance, 1.5);
        engine.set_volume(&instance, 0.25);
        let params = backend.params(voice);
        assert_eq!(params.pan, -1.0);
        assert_eq!(params.pitch, 1.5);
        assert_eq!(params.volume, 0.25);
        assert_eq!(instance.params(), params);

        engine.stop(&instance);
        assert!(!backend.is_playing(voice));
        assert_eq!(instance.state(), InstanceState::Pooled);
    }
}
