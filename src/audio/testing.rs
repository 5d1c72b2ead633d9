//! Fakes for the playback seams, shared by the audio tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;

use super::{
    backend::{
        Completion, PlayRequest, PlaybackHandle, PlaybackOutcome, StreamPlayer, VoiceGateway,
        VoiceHandle,
    },
    effects::{Limits, PlaybackSettings},
    session::{GuildEvent, Session, SessionConfig, SessionDeps, SessionEvent},
};
use crate::{
    error::{PlaybackError, ResolveError, VoiceError},
    sources::{ResolutionAdapter, ResolvedTrack, Resolver, SearchResult},
};

pub fn guild() -> GuildId {
    GuildId::new(42)
}

pub fn user() -> UserId {
    UserId::new(7)
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        limits: Limits::default(),
        default_volume: 50,
        max_queue_size: 100,
        max_song_duration: Duration::from_secs(3600),
        playback_start_timeout: Duration::from_secs(10),
        stream_url_ttl: Duration::from_secs(18000),
    }
}

pub fn resolved_with_duration(locator: &str, duration: Duration) -> ResolvedTrack {
    ResolvedTrack {
        stream_url: format!("https://cdn.test/{}", locator.replace(' ', "-")),
        title: locator.to_string(),
        duration: Some(duration),
        uploader: Some("Test Uploader".to_string()),
        webpage_url: None,
        thumbnail: None,
    }
}

/// Short, comparable form of an event: `started:Song A`, `exhausted`, ...
pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::TrackEnqueued { track, position } => {
            format!("enqueued:{}@{}", track.title, position)
        }
        SessionEvent::TrackStarted { track } => format!("started:{}", track.title),
        SessionEvent::TrackFailed { locator, .. } => format!("failed:{}", locator),
        SessionEvent::QueueExhausted => "exhausted".to_string(),
        SessionEvent::PlaybackError { track, .. } => format!("error:{}", track.title),
        SessionEvent::Disconnected { reason } => format!("disconnected:{:?}", reason),
    }
}

struct Hold {
    from_call: usize,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Resolver that answers with the locator as title unless told otherwise.
#[derive(Default)]
pub struct FakeResolver {
    calls: Mutex<HashMap<String, usize>>,
    overrides: Mutex<HashMap<String, Result<ResolvedTrack, ResolveError>>>,
    failures: Mutex<HashMap<(String, usize), ResolveError>>,
    holds: Mutex<HashMap<String, Hold>>,
}

impl FakeResolver {
    /// Every call for `locator` returns `result`.
    pub fn respond(&self, locator: &str, result: Result<ResolvedTrack, ResolveError>) {
        self.overrides.lock().insert(locator.to_string(), result);
    }

    /// Only the `call`-th call (1-based) for `locator` fails.
    pub fn fail_call(&self, locator: &str, call: usize, error: ResolveError) {
        self.failures
            .lock()
            .insert((locator.to_string(), call), error);
    }

    /// Calls for `locator` from the `from_call`-th on signal `entered` and
    /// block until `release` is notified.
    pub fn hold(&self, locator: &str, from_call: usize) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.holds.lock().insert(
            locator.to_string(),
            Hold {
                from_call,
                entered: entered.clone(),
                release: release.clone(),
            },
        );
        (entered, release)
    }

    pub fn calls(&self, locator: &str) -> usize {
        self.calls.lock().get(locator).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, locator: &str) -> Result<ResolvedTrack, ResolveError> {
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(locator.to_string()).or_default();
            *count += 1;
            *count
        };

        let gate = self
            .holds
            .lock()
            .get(locator)
            .filter(|hold| call >= hold.from_call)
            .map(|hold| (hold.entered.clone(), hold.release.clone()));
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }

        let failure = self.failures.lock().remove(&(locator.to_string(), call));
        if let Some(error) = failure {
            return Err(error);
        }
        let scripted = self.overrides.lock().get(locator).cloned();
        scripted.unwrap_or_else(|| Ok(resolved_with_duration(locator, Duration::from_secs(180))))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ResolveError> {
        Ok((1..=limit)
            .map(|i| SearchResult {
                title: format!("{} {}", query, i),
                url: format!("https://www.youtube.com/watch?v={}", i),
                duration: Some(Duration::from_secs(180)),
                uploader: None,
            })
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "fake"
    }
}

/// One `play` call seen by [`FakePlayer`].
#[derive(Clone)]
pub struct Started {
    pub title: String,
    pub settings: PlaybackSettings,
    pub completion: Arc<Completion>,
    stopped: Arc<AtomicBool>,
    volume: Arc<Mutex<Option<f32>>>,
}

impl Started {
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Last gain applied live through the handle.
    pub fn volume(&self) -> Option<f32> {
        *self.volume.lock()
    }
}

#[derive(Default)]
pub struct FakePlayer {
    started: Mutex<Vec<Started>>,
    failing: Mutex<HashSet<String>>,
    early_endings: Mutex<HashMap<String, PlaybackOutcome>>,
}

impl FakePlayer {
    pub fn fail_start(&self, title: &str) {
        self.failing.lock().insert(title.to_string());
    }

    /// The stream for `title` ends with `outcome` before `play` returns.
    pub fn end_while_starting(&self, title: &str, outcome: PlaybackOutcome) {
        self.early_endings.lock().insert(title.to_string(), outcome);
    }

    pub fn titles(&self) -> Vec<String> {
        self.started.lock().iter().map(|s| s.title.clone()).collect()
    }

    pub fn last(&self) -> Option<Started> {
        self.started.lock().last().cloned()
    }

    /// Reports the end of the most recent stream.
    pub fn finish_current(&self, outcome: PlaybackOutcome) {
        if let Some(started) = self.last() {
            started.completion.complete(outcome);
        }
    }
}

#[async_trait]
impl StreamPlayer for FakePlayer {
    async fn play(&self, request: PlayRequest) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        if self.failing.lock().contains(&request.title) {
            return Err(PlaybackError::Start("decoder rechazó el stream".to_string()));
        }

        let started = Started {
            title: request.title,
            settings: request.settings,
            completion: request.completion,
            stopped: Arc::new(AtomicBool::new(false)),
            volume: Arc::new(Mutex::new(None)),
        };
        let handle = FakeHandle {
            completion: started.completion.clone(),
            stopped: started.stopped.clone(),
            volume: started.volume.clone(),
        };
        let early_ending = self.early_endings.lock().remove(&started.title);
        let completion = started.completion.clone();
        self.started.lock().push(started);

        if let Some(outcome) = early_ending {
            completion.complete(outcome);
            // Deja correr la notificación de fin antes de confirmar el inicio
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }
        Ok(Box::new(handle))
    }
}

struct FakeHandle {
    completion: Arc<Completion>,
    stopped: Arc<AtomicBool>,
    volume: Arc<Mutex<Option<f32>>>,
}

impl PlaybackHandle for FakeHandle {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.completion.complete(PlaybackOutcome::Finished);
    }

    fn set_volume(&self, gain: f32) -> bool {
        *self.volume.lock() = Some(gain);
        true
    }
}

pub struct FakeVoice {
    channel: Mutex<Option<ChannelId>>,
    disconnects: AtomicUsize,
    active: AtomicBool,
}

#[async_trait]
impl VoiceHandle for FakeVoice {
    async fn channel(&self) -> Option<ChannelId> {
        *self.channel.lock()
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), VoiceError> {
        *self.channel.lock() = Some(channel_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.channel.lock() = None;
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeGateway {
    voices: Mutex<Vec<Arc<FakeVoice>>>,
}

impl FakeGateway {
    pub fn joins(&self) -> usize {
        self.voices.lock().len()
    }

    pub fn disconnects(&self) -> usize {
        self.voices
            .lock()
            .iter()
            .map(|v| v.disconnects.load(Ordering::SeqCst))
            .sum()
    }

    /// Makes every joined call report audio as playing.
    pub fn set_active(&self, active: bool) {
        for voice in self.voices.lock().iter() {
            voice.active.store(active, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceHandle>, VoiceError> {
        let voice = Arc::new(FakeVoice {
            channel: Mutex::new(Some(channel_id)),
            disconnects: AtomicUsize::new(0),
            active: AtomicBool::new(false),
        });
        self.voices.lock().push(voice.clone());
        Ok(voice)
    }
}

pub struct Fakes {
    pub resolver: Arc<FakeResolver>,
    pub player: Arc<FakePlayer>,
    pub gateway: Arc<FakeGateway>,
    pub events: flume::Receiver<GuildEvent>,
}

impl Fakes {
    /// Next event, or `"timeout"` if none arrives within a second.
    pub async fn next_event(&self) -> String {
        match tokio::time::timeout(Duration::from_secs(1), self.events.recv_async()).await {
            Ok(Ok(event)) => describe(&event.event),
            Ok(Err(_)) => "closed".to_string(),
            Err(_) => "timeout".to_string(),
        }
    }

    /// Everything already emitted.
    pub fn drain(&self) -> Vec<String> {
        self.events
            .try_iter()
            .map(|event| describe(&event.event))
            .collect()
    }
}

pub fn deps(config: SessionConfig) -> (Arc<SessionDeps>, Fakes) {
    let resolver = Arc::new(FakeResolver::default());
    let player = Arc::new(FakePlayer::default());
    let gateway = Arc::new(FakeGateway::default());
    let (events_tx, events_rx) = flume::unbounded();

    let deps = SessionDeps {
        resolver: ResolutionAdapter::new(resolver.clone(), Duration::from_secs(30)),
        player: player.clone(),
        gateway: gateway.clone(),
        events: events_tx,
        config,
    };

    let fakes = Fakes {
        resolver,
        player,
        gateway,
        events: events_rx,
    };
    (Arc::new(deps), fakes)
}

pub struct Harness {
    pub session: Arc<Session>,
    pub fakes: Fakes,
}

impl Harness {
    /// A session without a voice connection.
    pub fn new(config: SessionConfig) -> Self {
        let (deps, fakes) = deps(config);
        Self {
            session: Session::new(guild(), deps),
            fakes,
        }
    }

    pub async fn connected(config: SessionConfig) -> Self {
        let harness = Self::new(config);
        harness
            .session
            .connect(channel(1))
            .await
            .expect("connect in test harness");
        harness
    }
}
