use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serenity::model::id::UserId;
use std::{
    collections::VecDeque,
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{error::CommandError, sources::ResolvedTrack};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// URL de stream obtenida del resolutor y el momento en que se obtuvo.
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub url: String,
    pub resolved_at: Instant,
}

/// Una petición de reproducción.
///
/// Inmutable una vez creada: refrescar la URL de stream produce un valor nuevo
/// que conserva el mismo `id`.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub locator: String,
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub webpage_url: Option<String>,
    pub thumbnail: Option<String>,
    pub stream: Option<ResolvedStream>,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
}

impl Track {
    pub fn resolved(locator: &str, resolved: ResolvedTrack, requested_by: UserId) -> Self {
        Self {
            id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
            locator: locator.to_string(),
            title: resolved.title,
            uploader: resolved.uploader,
            duration: resolved.duration,
            webpage_url: resolved.webpage_url,
            thumbnail: resolved.thumbnail,
            stream: Some(ResolvedStream {
                url: resolved.stream_url,
                resolved_at: Instant::now(),
            }),
            requested_by,
            requested_at: Utc::now(),
        }
    }

    /// Misma petición con una URL de stream recién resuelta.
    pub fn refreshed(&self, resolved: ResolvedTrack) -> Self {
        Self {
            title: resolved.title,
            uploader: resolved.uploader.or_else(|| self.uploader.clone()),
            duration: resolved.duration.or(self.duration),
            webpage_url: resolved.webpage_url.or_else(|| self.webpage_url.clone()),
            thumbnail: resolved.thumbnail.or_else(|| self.thumbnail.clone()),
            stream: Some(ResolvedStream {
                url: resolved.stream_url,
                resolved_at: Instant::now(),
            }),
            ..self.clone()
        }
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stream.as_ref().map(|s| s.url.as_str())
    }

    /// Sin URL o con una URL más vieja que `ttl` hay que resolver de nuevo.
    pub fn needs_resolution(&self, ttl: Duration) -> bool {
        match &self.stream {
            Some(stream) => stream.resolved_at.elapsed() >= ttl,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    pub fn label(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "song",
            LoopMode::Queue => "queue",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LoopMode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" | "disable" => Ok(LoopMode::Off),
            "song" | "track" | "single" | "one" => Ok(LoopMode::Track),
            "queue" | "all" | "whole" => Ok(LoopMode::Queue),
            other => Err(CommandError::InvalidMode(other.to_string())),
        }
    }
}

/// Cola de pendientes (FIFO) con límite de tamaño.
///
/// Las posiciones que se exponen son 1-based; nunca contiene la pista actual.
#[derive(Debug)]
pub struct PendingQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl PendingQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final y devuelve su posición.
    pub fn push_back(&mut self, track: Track) -> Result<usize, CommandError> {
        if self.items.len() >= self.max_size {
            return Err(CommandError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
        Ok(self.items.len())
    }

    /// Reinserción por loop de canción: vuelve al frente, sin límite.
    pub fn requeue_front(&mut self, track: Track) {
        debug!("🔂 Repitiendo track: {}", track.title);
        self.items.push_front(track);
    }

    /// Reinserción por loop de cola: vuelve al final, sin límite.
    pub fn requeue_back(&mut self, track: Track) {
        debug!("🔁 Track agregado al final por loop de cola: {}", track.title);
        self.items.push_back(track);
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Elimina el track en `position` (1-based).
    pub fn remove(&mut self, position: usize) -> Result<Track, CommandError> {
        let len = self.items.len();
        if position == 0 || position > len {
            return Err(CommandError::InvalidPosition { position, len });
        }

        let removed = self
            .items
            .remove(position - 1)
            .ok_or(CommandError::InvalidPosition { position, len })?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(removed)
    }

    /// Permutación uniforme de los pendientes.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.items.make_contiguous().shuffle(rng);
        info!("🔀 Cola mezclada");
    }

    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }
}

/// Estado observable de una sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Resolviendo o arrancando el reproductor para la siguiente pista.
    Starting,
    Playing,
    Terminated,
}

/// Copia consistente del estado de una sesión en un instante.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: SessionState,
    pub current: Option<Track>,
    pub pending: Vec<Track>,
    pub loop_mode: LoopMode,
    pub volume: u16,
    pub effect_level: u8,
}

impl Snapshot {
    pub fn total_duration(&self) -> Duration {
        self.pending
            .iter()
            .chain(self.current.iter())
            .filter_map(|track| track.duration)
            .sum()
    }

    /// Obtiene una página específica de la cola
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.pending.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: self.pending[start..end].to_vec(),
            first_position: start + 1,
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn track(title: &str) -> Track {
        Track::resolved(
            title,
            ResolvedTrack {
                stream_url: format!("https://cdn.test/{title}"),
                title: title.to_string(),
                duration: Some(Duration::from_secs(60)),
                uploader: None,
                webpage_url: None,
                thumbnail: None,
            },
            UserId::new(1),
        )
    }

    fn titles(queue: &PendingQueue) -> Vec<String> {
        queue.to_vec().into_iter().map(|t| t.title).collect()
    }

    #[test]
    fn push_returns_one_based_positions() {
        let mut queue = PendingQueue::new(10);
        assert_eq!(queue.push_back(track("a")).unwrap(), 1);
        assert_eq!(queue.push_back(track("b")).unwrap(), 2);
    }

    #[test]
    fn push_respects_max_size_but_requeue_does_not() {
        let mut queue = PendingQueue::new(1);
        queue.push_back(track("a")).unwrap();
        assert_eq!(
            queue.push_back(track("b")).unwrap_err(),
            CommandError::QueueFull { max: 1 }
        );

        queue.requeue_back(track("c"));
        queue.requeue_front(track("d"));
        assert_eq!(titles(&queue), vec!["d", "a", "c"]);
    }

    #[test]
    fn remove_validates_positions() {
        let mut queue = PendingQueue::new(10);
        for title in ["a", "b", "c"] {
            queue.push_back(track(title)).unwrap();
        }

        assert_eq!(
            queue.remove(0).unwrap_err(),
            CommandError::InvalidPosition { position: 0, len: 3 }
        );
        assert_eq!(
            queue.remove(4).unwrap_err(),
            CommandError::InvalidPosition { position: 4, len: 3 }
        );
        assert_eq!(queue.remove(2).unwrap().title, "b");
        assert_eq!(titles(&queue), vec!["a", "c"]);
    }

    #[test]
    fn shuffle_keeps_every_track() {
        let mut queue = PendingQueue::new(100);
        for i in 0..20 {
            queue.push_back(track(&i.to_string())).unwrap();
        }

        queue.shuffle(&mut StdRng::seed_from_u64(7));

        let mut shuffled = titles(&queue);
        shuffled.sort_by_key(|t| t.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn loop_mode_parses_aliases() {
        assert_eq!("song".parse::<LoopMode>().unwrap(), LoopMode::Track);
        assert_eq!("QUEUE".parse::<LoopMode>().unwrap(), LoopMode::Queue);
        assert_eq!("off".parse::<LoopMode>().unwrap(), LoopMode::Off);
        assert_eq!(
            "forever".parse::<LoopMode>().unwrap_err(),
            CommandError::InvalidMode("forever".into())
        );
    }

    #[test]
    fn refreshed_track_keeps_identity() {
        let original = track("a");
        let refreshed = original.refreshed(ResolvedTrack {
            stream_url: "https://cdn.test/new".into(),
            title: "a".into(),
            duration: None,
            uploader: None,
            webpage_url: None,
            thumbnail: None,
        });

        assert_eq!(refreshed.id, original.id);
        assert_eq!(refreshed.stream_url(), Some("https://cdn.test/new"));
        assert_eq!(refreshed.duration, Some(Duration::from_secs(60)));
    }

    #[test]
    fn zero_ttl_always_needs_resolution() {
        let t = track("a");
        assert!(t.needs_resolution(Duration::ZERO));
        assert!(!t.needs_resolution(Duration::from_secs(3600)));
    }

    #[test]
    fn snapshot_pages() {
        let pending: Vec<Track> = (1..=12).map(|i| track(&i.to_string())).collect();
        let snapshot = Snapshot {
            state: SessionState::Playing,
            current: Some(track("now")),
            pending,
            loop_mode: LoopMode::Off,
            volume: 50,
            effect_level: 0,
        };

        let second = snapshot.page(2, 10);
        assert_eq!(second.total_pages, 2);
        assert_eq!(second.first_position, 11);
        assert_eq!(second.items.len(), 2);
        assert_eq!(snapshot.page(99, 10).current_page, 2);
        assert_eq!(snapshot.total_duration(), Duration::from_secs(13 * 60));
    }
}
