use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u16,
    pub min_volume: u16,
    pub max_volume: u16,
    pub effect_levels: u8,

    // Cola
    pub max_queue_size: usize,
    pub max_song_duration: u64, // En segundos

    // Tiempos (segundos)
    pub resolution_timeout: u64,
    pub playback_start_timeout: u64,
    pub idle_disconnect: u64,
    pub stream_url_ttl: u64,

    // Herramientas externas
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub max_concurrent_resolutions: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            guild_id: std::env::var("GUILD_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|id| *id != 0),

            // Audio
            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            min_volume: env_or("MIN_VOLUME", defaults.min_volume)?,
            max_volume: env_or("MAX_VOLUME", defaults.max_volume)?,
            effect_levels: env_or("EFFECT_LEVELS", defaults.effect_levels)?,

            // Cola
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_song_duration: env_or("MAX_SONG_DURATION", defaults.max_song_duration)?,

            // Tiempos
            resolution_timeout: env_or("RESOLUTION_TIMEOUT", defaults.resolution_timeout)?,
            playback_start_timeout: env_or(
                "PLAYBACK_START_TIMEOUT",
                defaults.playback_start_timeout,
            )?,
            idle_disconnect: env_or("IDLE_DISCONNECT", defaults.idle_disconnect)?,
            stream_url_ttl: env_or("STREAM_URL_TTL", defaults.stream_url_ttl)?,

            // Herramientas
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            max_concurrent_resolutions: env_or(
                "MAX_CONCURRENT_RESOLUTIONS",
                defaults.max_concurrent_resolutions,
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - `min_volume <= default_volume <= max_volume <= 1000`
    /// - Between 1 and 5 effect presets (the bass-boost ladder has five steps)
    /// - Queue size and every timeout must be greater than zero
    pub fn validate(&self) -> Result<()> {
        if self.min_volume > self.max_volume {
            anyhow::bail!(
                "MIN_VOLUME ({}) cannot exceed MAX_VOLUME ({})",
                self.min_volume,
                self.max_volume
            );
        }

        if self.max_volume > 1000 {
            anyhow::bail!("MAX_VOLUME cannot exceed 1000%, got: {}", self.max_volume);
        }

        if !(self.min_volume..=self.max_volume).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between {} and {}, got: {}",
                self.min_volume,
                self.max_volume,
                self.default_volume
            );
        }

        if self.effect_levels == 0 || self.effect_levels > 5 {
            anyhow::bail!("EFFECT_LEVELS must be between 1 and 5, got: {}", self.effect_levels);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        if self.resolution_timeout == 0 || self.playback_start_timeout == 0 {
            anyhow::bail!("Resolution and playback start timeouts must be greater than 0");
        }

        if self.idle_disconnect == 0 {
            anyhow::bail!("Idle disconnect threshold must be greater than 0");
        }

        if self.max_concurrent_resolutions == 0 {
            anyhow::bail!("At least one concurrent resolution is required");
        }

        Ok(())
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_secs(self.resolution_timeout)
    }

    pub fn playback_start_timeout(&self) -> Duration {
        Duration::from_secs(self.playback_start_timeout)
    }

    pub fn idle_disconnect(&self) -> Duration {
        Duration::from_secs(self.idle_disconnect)
    }

    pub fn stream_url_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_url_ttl)
    }

    pub fn max_song_duration(&self) -> Duration {
        Duration::from_secs(self.max_song_duration)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Audio: {}% vol ({}-{}%), {} effect levels\n  \
            Queue: {} tracks, {} max duration\n  \
            Timeouts: resolve {}, start {}, idle {}, stream TTL {}",
            self.guild_id
                .map_or("global".to_string(), |id| format!("guild {}", id)),
            self.default_volume,
            self.min_volume,
            self.max_volume,
            self.effect_levels,
            self.max_queue_size,
            humantime::format_duration(self.max_song_duration()),
            humantime::format_duration(self.resolution_timeout()),
            humantime::format_duration(self.playback_start_timeout()),
            humantime::format_duration(self.idle_disconnect()),
            humantime::format_duration(self.stream_url_ttl()),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            // Audio defaults
            default_volume: 50,
            min_volume: 0,
            max_volume: 150, // 101-150: modo boost
            effect_levels: 5,

            // Queue defaults
            max_queue_size: 100,
            max_song_duration: 3600, // 1 hora

            // Timeouts
            resolution_timeout: 30,
            playback_start_timeout: 10,
            idle_disconnect: 300,  // 5 minutos
            stream_url_ttl: 18000, // las URLs de CDN caducan a las pocas horas

            // Tools
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            max_concurrent_resolutions: 3,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {}", key, value)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_volume, 150);
        assert_eq!(config.idle_disconnect(), Duration::from_secs(300));
    }

    #[test]
    fn default_volume_must_fit_bounds() {
        let config = Config {
            default_volume: 151,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn effect_levels_are_bounded() {
        let none = Config {
            effect_levels: 0,
            ..Config::default()
        };
        let too_many = Config {
            effect_levels: 6,
            ..Config::default()
        };
        assert!(none.validate().is_err());
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("5m"));
    }
}
