//! Error types shared by the playback core and its collaborators.
//!
//! Precondition signals such as "nothing is playing" are not errors; they are
//! variants of each command's outcome type in [`crate::audio::session`].

use std::time::Duration;
use thiserror::Error;

/// Why a locator could not be turned into a playable track.
///
/// Every variant is terminal for the track: it never enters the queue (or is
/// dropped from it) and playback continues with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Nothing matched, including a playlist with zero entries.
    #[error("no se encontró ningún resultado")]
    NotFound,

    #[error("la búsqueda excedió el tiempo límite ({})", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// A single entry was found but its stream cannot be played.
    #[error("el audio no es reproducible: {0}")]
    Unplayable(String),

    #[error("la canción dura {} (máximo {})", humantime::format_duration(*.actual), humantime::format_duration(*.max))]
    TooLong { actual: Duration, max: Duration },

    /// The resolver itself failed (missing binary, crashed process, ...).
    #[error("error del extractor: {0}")]
    Failed(String),
}

/// Failure reported by the stream player when starting or during playback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no hay conexión de voz activa")]
    NoVoiceConnection,

    #[error("no se pudo iniciar la reproducción: {0}")]
    Start(String),

    #[error("el reproductor no respondió en {}", humantime::format_duration(*.0))]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("error al conectar al canal de voz: {0}")]
    Join(String),

    #[error("error al desconectar: {0}")]
    Disconnect(String),
}

/// Rejection of a session command. No state changes when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("la sesión de música ya terminó")]
    Terminated,

    #[error("no se pudo agregar `{locator}`: {reason}")]
    ResolutionFailed {
        locator: String,
        reason: ResolveError,
    },

    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("{what} fuera de rango: {value} (permitido {min}-{max})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("posición inválida: {position} (la cola tiene {len} canciones)")]
    InvalidPosition { position: usize, len: usize },

    #[error("modo de repetición inválido: `{0}` (usa off, song o queue)")]
    InvalidMode(String),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

impl CommandError {
    /// True for the `InvalidCommandArgument` family: rejected synchronously
    /// because an argument is outside its domain.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. } | Self::InvalidPosition { .. } | Self::InvalidMode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_errors_are_classified() {
        assert!(CommandError::InvalidMode("x".into()).is_invalid_argument());
        assert!(CommandError::InvalidPosition { position: 0, len: 2 }.is_invalid_argument());
        assert!(!CommandError::Terminated.is_invalid_argument());
        assert!(!CommandError::QueueFull { max: 1 }.is_invalid_argument());
    }

    #[test]
    fn timeout_renders_human_duration() {
        let message = ResolveError::Timeout(Duration::from_secs(30)).to_string();
        assert!(message.contains("30s"), "{message}");
    }
}
