//! Per-guild playback state machine.
//!
//! A [`Session`] owns the pending queue, the current track, the loop mode, the
//! playback settings and the guild's voice handle. Every read-modify-write of
//! that state happens under one `parking_lot::Mutex` that is never held across
//! an `.await`; resolution and player start run outside it.
//!
//! Two counters keep concurrent commands from corrupting the sequence:
//!
//! - `episode` identifies one playback start. Completion callbacks carry it and
//!   are ignored unless they belong to the live episode, so each start is
//!   followed by exactly one transition.
//! - `epoch` is bumped by stop, skip and terminate. A resolution or player
//!   start that finishes after the epoch moved is discarded (and a stream that
//!   did start is stopped again).
//!
//! "Play next" lives in one place: [`Session::advance`] pops tracks until one
//! starts or the queue runs dry; [`Session::transition`] decides what happens
//! to the track that just ended.

use parking_lot::Mutex;
use rand::thread_rng;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    backend::{
        Completion, PlayRequest, PlaybackHandle, PlaybackOutcome, StreamPlayer, VoiceGateway,
        VoiceHandle,
    },
    effects::{BassBoost, Limits, PlaybackSettings},
    queue::{LoopMode, PendingQueue, SessionState, Snapshot, Track},
};
use crate::{
    config::Config,
    error::{CommandError, PlaybackError, ResolveError},
    sources::ResolutionAdapter,
};

/// Parámetros de sesión derivados de [`Config`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub limits: Limits,
    pub default_volume: u16,
    pub max_queue_size: usize,
    pub max_song_duration: Duration,
    pub playback_start_timeout: Duration,
    pub stream_url_ttl: Duration,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limits: Limits::from_config(config),
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
            max_song_duration: config.max_song_duration(),
            playback_start_timeout: config.playback_start_timeout(),
            stream_url_ttl: config.stream_url_ttl(),
        }
    }
}

/// Colaboradores compartidos por todas las sesiones.
pub struct SessionDeps {
    pub resolver: ResolutionAdapter,
    pub player: Arc<dyn StreamPlayer>,
    pub gateway: Arc<dyn VoiceGateway>,
    pub events: flume::Sender<GuildEvent>,
    pub config: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `/leave` o `terminate` explícito.
    Requested,
    Idle,
    /// El bot fue expulsado o movido fuera de voz desde Discord.
    VoiceLost,
    Shutdown,
}

/// Notificaciones salientes de una sesión.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TrackEnqueued { track: Track, position: usize },
    TrackStarted { track: Track },
    TrackFailed { locator: String, reason: ResolveError },
    QueueExhausted,
    PlaybackError { track: Track, error: String },
    Disconnected { reason: DisconnectReason },
}

#[derive(Debug, Clone)]
pub struct GuildEvent {
    pub guild_id: GuildId,
    pub text_channel: Option<ChannelId>,
    pub event: SessionEvent,
}

#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub track: Track,
    /// Posición 1-based en la cola de pendientes.
    pub position: usize,
    /// La sesión estaba libre y con voz: la pista arrancó de inmediato.
    pub playing_now: bool,
}

#[derive(Debug, Clone)]
pub enum SkipOutcome {
    Skipped(Track),
    NothingPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { cleared: usize },
    NothingPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleOutcome {
    Shuffled(usize),
    QueueTooShort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared(usize),
    QueueEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeApplied {
    pub volume: u16,
    /// También se aplicó a la pista que está sonando.
    pub live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Moved,
    AlreadyConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    Terminated,
    AlreadyTerminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceCause {
    Enqueued,
    Connected,
    Finished,
    Skipped,
}

impl AdvanceCause {
    /// Only the end of a track makes an empty queue worth announcing.
    fn reports_exhaustion(self) -> bool {
        matches!(self, AdvanceCause::Finished | AdvanceCause::Skipped)
    }
}

enum Step {
    Done,
    Next,
}

enum Phase {
    Idle,
    Starting {
        episode: u64,
        track: Track,
        early_finish: Option<PlaybackOutcome>,
    },
    Playing {
        episode: u64,
        track: Track,
        handle: Box<dyn PlaybackHandle>,
        skipped: bool,
    },
    Terminated,
}

impl Phase {
    fn episode(&self) -> Option<u64> {
        match self {
            Phase::Starting { episode, .. } | Phase::Playing { episode, .. } => Some(*episode),
            Phase::Idle | Phase::Terminated => None,
        }
    }
}

struct SessionInner {
    phase: Phase,
    queue: PendingQueue,
    loop_mode: LoopMode,
    volume: u16,
    effect_level: u8,
    voice: Option<Arc<dyn VoiceHandle>>,
    text_channel: Option<ChannelId>,
    last_activity: Instant,
    epoch: u64,
    next_episode: u64,
}

impl SessionInner {
    fn ensure_alive(&self) -> Result<(), CommandError> {
        match self.phase {
            Phase::Terminated => Err(CommandError::Terminated),
            _ => Ok(()),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            volume: self.volume,
            effect_level: self.effect_level,
        }
    }

    fn current(&self) -> Option<&Track> {
        match &self.phase {
            Phase::Starting { track, .. } | Phase::Playing { track, .. } => Some(track),
            Phase::Idle | Phase::Terminated => None,
        }
    }

    fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Starting { .. } => SessionState::Starting,
            Phase::Playing { .. } => SessionState::Playing,
            Phase::Terminated => SessionState::Terminated,
        }
    }

    fn is_live_start(&self, epoch: u64, episode: u64) -> bool {
        self.epoch == epoch
            && matches!(self.phase, Phase::Starting { episode: live, .. } if live == episode)
    }
}

/// Lo que hay que soltar fuera del lock al terminar.
struct Released {
    handle: Option<Box<dyn PlaybackHandle>>,
    voice: Option<Arc<dyn VoiceHandle>>,
}

pub struct Session {
    guild_id: GuildId,
    deps: Arc<SessionDeps>,
    inner: Mutex<SessionInner>,
    this: Weak<Session>,
}

impl Session {
    pub fn new(guild_id: GuildId, deps: Arc<SessionDeps>) -> Arc<Self> {
        let inner = SessionInner {
            phase: Phase::Idle,
            queue: PendingQueue::new(deps.config.max_queue_size),
            loop_mode: LoopMode::Off,
            volume: deps.config.default_volume,
            effect_level: 0,
            voice: None,
            text_channel: None,
            last_activity: Instant::now(),
            epoch: 0,
            next_episode: 0,
        };

        Arc::new_cyclic(|this| Self {
            guild_id,
            deps,
            inner: Mutex::new(inner),
            this: this.clone(),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Resuelve `locator` y lo agrega al final de la cola.
    ///
    /// Resolution happens once, eagerly and outside the session lock; nothing
    /// is queued when it fails. A session terminated while the resolver was
    /// running rejects the result.
    pub async fn enqueue(
        &self,
        locator: &str,
        requested_by: UserId,
    ) -> Result<EnqueueOutcome, CommandError> {
        let locator = locator.trim();
        {
            let mut inner = self.inner.lock();
            inner.ensure_alive()?;
            if inner.queue.len() >= self.deps.config.max_queue_size {
                return Err(CommandError::QueueFull {
                    max: self.deps.config.max_queue_size,
                });
            }
            inner.touch();
        }

        let resolved = self
            .deps
            .resolver
            .resolve(locator)
            .await
            .map_err(|reason| CommandError::ResolutionFailed {
                locator: locator.to_string(),
                reason,
            })?;

        let max = self.deps.config.max_song_duration;
        if let Some(actual) = resolved.duration.filter(|duration| *duration > max) {
            return Err(CommandError::ResolutionFailed {
                locator: locator.to_string(),
                reason: ResolveError::TooLong { actual, max },
            });
        }

        let track = Track::resolved(locator, resolved, requested_by);
        let (position, idle) = {
            let mut inner = self.inner.lock();
            inner.ensure_alive()?;
            let position = inner.queue.push_back(track.clone())?;
            inner.touch();
            self.emit(
                &inner,
                SessionEvent::TrackEnqueued {
                    track: track.clone(),
                    position,
                },
            );
            let idle = matches!(inner.phase, Phase::Idle) && inner.voice.is_some();
            (position, idle)
        };

        if idle {
            self.advance(AdvanceCause::Enqueued).await;
        }

        let playing_now = idle && self.is_playing(track.id);
        Ok(EnqueueOutcome {
            track,
            position,
            playing_now,
        })
    }

    /// Une la sesión a `channel_id`, o la mueve si ya estaba en otro canal.
    pub async fn connect(&self, channel_id: ChannelId) -> Result<ConnectOutcome, CommandError> {
        let existing = {
            let mut inner = self.inner.lock();
            inner.ensure_alive()?;
            inner.touch();
            inner.voice.clone()
        };

        let outcome = match existing {
            Some(voice) => {
                if voice.channel().await == Some(channel_id) {
                    ConnectOutcome::AlreadyConnected
                } else {
                    voice.move_to(channel_id).await?;
                    info!("🔀 Movido al canal {} en guild {}", channel_id, self.guild_id);
                    ConnectOutcome::Moved
                }
            }
            None => {
                let voice = self.deps.gateway.join(self.guild_id, channel_id).await?;
                let rejected = {
                    let mut inner = self.inner.lock();
                    match inner.ensure_alive() {
                        Ok(()) => {
                            inner.voice = Some(voice);
                            None
                        }
                        Err(_) => Some(voice),
                    }
                };
                if let Some(voice) = rejected {
                    if let Err(e) = voice.disconnect().await {
                        warn!("⚠️ No se pudo soltar la conexión tardía: {}", e);
                    }
                    return Err(CommandError::Terminated);
                }
                info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, self.guild_id);
                ConnectOutcome::Connected
            }
        };

        self.advance(AdvanceCause::Connected).await;
        Ok(outcome)
    }

    /// Detiene la pista actual; el callback de fin decide qué sigue.
    ///
    /// Concurrent skips of the same track coalesce into one advancement.
    pub async fn skip(&self) -> Result<SkipOutcome, CommandError> {
        let (outcome, advance_now) = {
            let mut inner = self.inner.lock();
            inner.ensure_alive()?;
            inner.touch();

            match std::mem::replace(&mut inner.phase, Phase::Idle) {
                Phase::Playing {
                    episode,
                    track,
                    handle,
                    skipped,
                } => {
                    if skipped {
                        debug!("⏭️ Skip ya en curso para: {}", track.title);
                    } else {
                        inner.epoch += 1;
                        info!("⏭️ Saltando: {}", track.title);
                        handle.stop();
                    }
                    let outcome = SkipOutcome::Skipped(track.clone());
                    inner.phase = Phase::Playing {
                        episode,
                        track,
                        handle,
                        skipped: true,
                    };
                    (outcome, false)
                }
                Phase::Starting { track, .. } => {
                    // Todavía no hay stream que detener: el avance lo hace el skip.
                    inner.epoch += 1;
                    info!("⏭️ Saltando antes de empezar: {}", track.title);
                    if inner.loop_mode == LoopMode::Queue {
                        inner.queue.requeue_back(track.clone());
                    }
                    (SkipOutcome::Skipped(track), true)
                }
                other => {
                    inner.phase = other;
                    (SkipOutcome::NothingPlaying, false)
                }
            }
        };

        if advance_now {
            self.advance(AdvanceCause::Skipped).await;
        }
        Ok(outcome)
    }

    /// Detiene la reproducción y vacía la cola. Nunca avanza.
    pub fn stop(&self) -> Result<StopOutcome, CommandError> {
        let (outcome, handle) = {
            let mut inner = self.inner.lock();
            inner.ensure_alive()?;
            inner.touch();
            inner.epoch += 1;
            let cleared = inner.queue.clear();

            match std::mem::replace(&mut inner.phase, Phase::Idle) {
                Phase::Playing { handle, .. } => (StopOutcome::Stopped { cleared }, Some(handle)),
                Phase::Starting { .. } => (StopOutcome::Stopped { cleared }, None),
                _ => (StopOutcome::NothingPlaying, None),
            }
        };

        if let Some(handle) = handle {
            handle.stop();
        }
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(outcome)
    }

    pub fn remove(&self, position: usize) -> Result<Track, CommandError> {
        let mut inner = self.inner.lock();
        inner.ensure_alive()?;
        inner.touch();
        inner.queue.remove(position)
    }

    pub fn shuffle(&self) -> Result<ShuffleOutcome, CommandError> {
        let mut inner = self.inner.lock();
        inner.ensure_alive()?;
        inner.touch();

        let len = inner.queue.len();
        if len < 2 {
            return Ok(ShuffleOutcome::QueueTooShort);
        }
        inner.queue.shuffle(&mut thread_rng());
        Ok(ShuffleOutcome::Shuffled(len))
    }

    /// Vacía los pendientes sin tocar la pista actual.
    pub fn clear(&self) -> Result<ClearOutcome, CommandError> {
        let mut inner = self.inner.lock();
        inner.ensure_alive()?;
        inner.touch();

        match inner.queue.clear() {
            0 => Ok(ClearOutcome::QueueEmpty),
            cleared => Ok(ClearOutcome::Cleared(cleared)),
        }
    }

    pub fn set_volume(&self, value: i64) -> Result<VolumeApplied, CommandError> {
        let mut inner = self.inner.lock();
        inner.ensure_alive()?;
        let volume = self.deps.config.limits.check_volume(value)?;
        inner.touch();
        inner.volume = volume;

        let gain = inner.settings().gain();
        let live = match &inner.phase {
            Phase::Playing { handle, .. } => handle.set_volume(gain),
            _ => false,
        };
        info!("🔊 Volumen ajustado a {}%", volume);
        Ok(VolumeApplied { volume, live })
    }

    /// El nivel de efecto se aplica a partir de la siguiente pista.
    pub fn set_effect(&self, value: i64) -> Result<BassBoost, CommandError> {
        let mut inner = self.inner.lock();
        inner.ensure_alive()?;
        let level = self.deps.config.limits.check_effect(value)?;
        inner.touch();
        inner.effect_level = level;

        let boost = inner.settings().bass_boost();
        info!("🎛️ Efecto ajustado: {}", boost.label());
        Ok(boost)
    }

    pub fn set_loop(&self, mode: LoopMode) -> Result<LoopMode, CommandError> {
        let mut inner = self.inner.lock();
        inner.ensure_alive()?;
        inner.touch();
        inner.loop_mode = mode;
        info!("🔁 Modo loop: {}", mode);
        Ok(mode)
    }

    /// Copia consistente del estado. Funciona también sobre sesiones terminadas.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            state: inner.state(),
            current: inner.current().cloned(),
            pending: inner.queue.to_vec(),
            loop_mode: inner.loop_mode,
            volume: inner.volume,
            effect_level: inner.effect_level,
        }
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.inner.lock().current().cloned()
    }

    /// El stream de la pista `id` está sonando (no sólo iniciándose).
    fn is_playing(&self, id: u64) -> bool {
        matches!(&self.inner.lock().phase, Phase::Playing { track, .. } if track.id == id)
    }

    /// Canal donde se publican las notificaciones de esta guild.
    pub fn set_text_channel(&self, channel_id: ChannelId) {
        self.inner.lock().text_channel = Some(channel_id);
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.inner.lock().phase, Phase::Terminated)
    }

    pub fn idle_for(&self) -> Duration {
        self.inner.lock().last_activity.elapsed()
    }

    /// ¿La llamada de voz reporta audio sonando o pausado?
    pub async fn voice_active(&self) -> bool {
        let voice = self.inner.lock().voice.clone();
        match voice {
            Some(voice) => voice.is_active().await,
            None => false,
        }
    }

    /// Termina la sesión: detiene el stream, vacía todo y suelta la voz.
    ///
    /// Idempotent, and never waits for an in-flight resolution; its result is
    /// discarded when it lands.
    pub async fn terminate(&self, reason: DisconnectReason) -> TerminateOutcome {
        let released = {
            let mut inner = self.inner.lock();
            if matches!(inner.phase, Phase::Terminated) {
                return TerminateOutcome::AlreadyTerminated;
            }
            self.teardown(&mut inner, reason)
        };

        self.release(released).await;
        TerminateOutcome::Terminated
    }

    /// Termina sólo si la sesión sigue inactiva más allá de `threshold`.
    ///
    /// The check and the teardown happen under the same lock, so a command
    /// that touched the session first always wins.
    pub async fn terminate_if_idle(&self, threshold: Duration) -> bool {
        let released = {
            let mut inner = self.inner.lock();
            let idle = matches!(inner.phase, Phase::Idle)
                && inner.queue.is_empty()
                && inner.last_activity.elapsed() > threshold;
            if !idle {
                return false;
            }
            info!(
                "💤 Guild {} inactiva por más de {}",
                self.guild_id,
                humantime::format_duration(threshold)
            );
            self.teardown(&mut inner, DisconnectReason::Idle)
        };

        self.release(released).await;
        true
    }

    pub(crate) async fn on_playback_finished(&self, episode: u64, outcome: PlaybackOutcome) {
        let advance = {
            let mut inner = self.inner.lock();
            let live = inner.phase.episode() == Some(episode);
            let starting = matches!(inner.phase, Phase::Starting { .. });

            if !live {
                debug!("🗑️ Fin de episodio {} ignorado (ya no es el actual)", episode);
                false
            } else if starting {
                // El reproductor terminó antes de que confirmáramos el inicio.
                if let Phase::Starting { early_finish, .. } = &mut inner.phase {
                    *early_finish = Some(outcome);
                }
                false
            } else {
                self.transition(&mut inner, outcome)
            }
        };

        if advance {
            self.advance(AdvanceCause::Finished).await;
        }
    }

    /// Reproduce la siguiente pista disponible.
    ///
    /// Each iteration pops one track, so the loop ends after at most
    /// `queue.len()` failures.
    async fn advance(&self, cause: AdvanceCause) {
        let mut report_exhaustion = cause.reports_exhaustion();

        loop {
            let (episode, epoch, track, settings) = {
                let mut inner = self.inner.lock();
                if !matches!(inner.phase, Phase::Idle) || inner.voice.is_none() {
                    return;
                }

                let Some(track) = inner.queue.pop_front() else {
                    if report_exhaustion {
                        info!("📭 Cola terminada en guild {}", self.guild_id);
                        self.emit(&inner, SessionEvent::QueueExhausted);
                    }
                    return;
                };

                inner.next_episode += 1;
                let episode = inner.next_episode;
                inner.phase = Phase::Starting {
                    episode,
                    track: track.clone(),
                    early_finish: None,
                };
                (episode, inner.epoch, track, inner.settings())
            };

            match self.start(episode, epoch, track, settings).await {
                Step::Done => return,
                Step::Next => report_exhaustion = true,
            }
        }
    }

    async fn start(
        &self,
        episode: u64,
        epoch: u64,
        track: Track,
        settings: PlaybackSettings,
    ) -> Step {
        let track = if track.needs_resolution(self.deps.config.stream_url_ttl) {
            debug!("🔄 Resolviendo de nuevo: {}", track.title);
            let resolved = self.deps.resolver.resolve(&track.locator).await;

            let mut inner = self.inner.lock();
            if !inner.is_live_start(epoch, episode) {
                debug!("🗑️ Resolución descartada para episodio {}", episode);
                return Step::Done;
            }
            match resolved {
                Ok(resolved) => {
                    let refreshed = track.refreshed(resolved);
                    if let Phase::Starting { track: starting, .. } = &mut inner.phase {
                        *starting = refreshed.clone();
                    }
                    refreshed
                }
                Err(reason) => {
                    warn!("❌ No se pudo resolver {}: {}", track.locator, reason);
                    inner.phase = Phase::Idle;
                    self.emit(
                        &inner,
                        SessionEvent::TrackFailed {
                            locator: track.locator.clone(),
                            reason,
                        },
                    );
                    return Step::Next;
                }
            }
        } else {
            track
        };

        let request = PlayRequest {
            guild_id: self.guild_id,
            episode,
            stream_url: track.stream_url().unwrap_or_default().to_string(),
            title: track.title.clone(),
            settings,
            completion: self.completion_for(episode),
        };

        let limit = self.deps.config.playback_start_timeout;
        let started = tokio::time::timeout(limit, self.deps.player.play(request))
            .await
            .unwrap_or(Err(PlaybackError::Timeout(limit)));

        let mut inner = self.inner.lock();
        if !inner.is_live_start(epoch, episode) {
            debug!("🗑️ Inicio descartado para episodio {}", episode);
            if let Ok(handle) = started {
                handle.stop();
            }
            return Step::Done;
        }

        let handle = match started {
            Ok(handle) => handle,
            Err(e) => {
                error!("❌ Error al reproducir {}: {}", track.title, e);
                inner.phase = Phase::Idle;
                self.emit(
                    &inner,
                    SessionEvent::PlaybackError {
                        track,
                        error: e.to_string(),
                    },
                );
                return Step::Next;
            }
        };

        let early_finish = match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Starting { early_finish, .. } => early_finish,
            _ => None,
        };

        // El volumen pudo cambiar mientras la pista se iniciaba
        if inner.volume != settings.volume && !handle.set_volume(inner.settings().gain()) {
            warn!("⚠️ No se pudo ajustar el volumen de {}", track.title);
        }

        info!("🎵 Reproduciendo: {}", track.title);
        self.emit(
            &inner,
            SessionEvent::TrackStarted {
                track: track.clone(),
            },
        );
        inner.phase = Phase::Playing {
            episode,
            track,
            handle,
            skipped: false,
        };

        match early_finish {
            Some(outcome) => {
                if self.transition(&mut inner, outcome) {
                    Step::Next
                } else {
                    Step::Done
                }
            }
            None => Step::Done,
        }
    }

    /// Cierra el episodio actual y reinserta la pista según el modo loop.
    ///
    /// Returns `true` when the caller must advance. Failed tracks are never
    /// reinserted; a skipped track only comes back in whole-queue mode.
    fn transition(&self, inner: &mut SessionInner, outcome: PlaybackOutcome) -> bool {
        let (track, skipped) = match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Playing { track, skipped, .. } => (track, skipped),
            other => {
                inner.phase = other;
                return false;
            }
        };
        inner.touch();

        match outcome {
            PlaybackOutcome::Failed(e) => {
                error!("❌ Error durante la reproducción de {}: {}", track.title, e);
                self.emit(inner, SessionEvent::PlaybackError { track, error: e });
            }
            PlaybackOutcome::Finished => {
                debug!("✅ Terminó: {}", track.title);
                match (inner.loop_mode, skipped) {
                    (LoopMode::Track, false) => inner.queue.requeue_front(track),
                    (LoopMode::Queue, _) => inner.queue.requeue_back(track),
                    _ => {}
                }
            }
        }
        true
    }

    fn teardown(&self, inner: &mut SessionInner, reason: DisconnectReason) -> Released {
        inner.epoch += 1;
        inner.queue.clear();

        let handle = match std::mem::replace(&mut inner.phase, Phase::Terminated) {
            Phase::Playing { handle, .. } => Some(handle),
            _ => None,
        };
        let voice = inner.voice.take();

        info!("👋 Sesión terminada en guild {} ({:?})", self.guild_id, reason);
        self.emit(inner, SessionEvent::Disconnected { reason });
        Released { handle, voice }
    }

    async fn release(&self, released: Released) {
        if let Some(handle) = released.handle {
            handle.stop();
        }
        if let Some(voice) = released.voice {
            if let Err(e) = voice.disconnect().await {
                warn!("⚠️ Error al desconectar guild {}: {}", self.guild_id, e);
            }
        }
    }

    fn completion_for(&self, episode: u64) -> Arc<Completion> {
        let session = self.this.clone();
        Completion::new(move |outcome| {
            let Some(session) = session.upgrade() else {
                return;
            };
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        session.on_playback_finished(episode, outcome).await;
                    });
                }
                Err(_) => warn!("⚠️ Fin del episodio {} fuera del runtime", episode),
            }
        })
    }

    fn emit(&self, inner: &SessionInner, event: SessionEvent) {
        let event = GuildEvent {
            guild_id: self.guild_id,
            text_channel: inner.text_channel,
            event,
        };
        if self.deps.events.send(event).is_err() {
            debug!("📭 Nadie escucha los eventos de guild {}", self.guild_id);
        }
    }
}
