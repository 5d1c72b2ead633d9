use tracing::debug;

use crate::{config::Config, error::CommandError};

/// Niveles de bass boost disponibles (índice = nivel de efecto)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BassBoost {
    Off,
    Light,
    Medium,
    Heavy,
    Extreme,
}

impl BassBoost {
    pub const LADDER: [BassBoost; 5] = [
        BassBoost::Off,
        BassBoost::Light,
        BassBoost::Medium,
        BassBoost::Heavy,
        BassBoost::Extreme,
    ];

    pub fn from_level(level: u8) -> Option<Self> {
        Self::LADDER.get(usize::from(level)).copied()
    }

    /// Ganancia del filtro `bass` de ffmpeg, en dB.
    pub fn gain_db(&self) -> u8 {
        match self {
            BassBoost::Off => 0,
            BassBoost::Light => 2,
            BassBoost::Medium => 4,
            BassBoost::Heavy => 6,
            BassBoost::Extreme => 8,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BassBoost::Off => "Audio normal",
            BassBoost::Light => "Bass boost ligero",
            BassBoost::Medium => "Bass boost medio",
            BassBoost::Heavy => "Bass boost intenso",
            BassBoost::Extreme => "BASS EXTREMO 💥",
        }
    }
}

/// Volumen y efecto con que arranca una reproducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    /// Porcentaje; 100 = nivel original, >100 = boost.
    pub volume: u16,
    pub effect_level: u8,
}

impl PlaybackSettings {
    pub fn gain(&self) -> f32 {
        f32::from(self.volume) / 100.0
    }

    pub fn bass_boost(&self) -> BassBoost {
        BassBoost::from_level(self.effect_level).unwrap_or(BassBoost::Off)
    }

    /// Cadena `-af` para ffmpeg, o `None` si no hace falta filtrar.
    pub fn ffmpeg_filter(&self) -> Option<String> {
        match self.bass_boost() {
            BassBoost::Off => None,
            boost => {
                let filter = format!("bass=g={}", boost.gain_db());
                debug!("🎛️ Filtro de audio: {}", filter);
                Some(filter)
            }
        }
    }
}

/// Dominios válidos para volumen y nivel de efecto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min_volume: u16,
    pub max_volume: u16,
    pub effect_levels: u8,
}

impl Limits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_volume: config.min_volume,
            max_volume: config.max_volume,
            effect_levels: config.effect_levels.min(BassBoost::LADDER.len() as u8),
        }
    }

    pub fn max_effect_level(&self) -> u8 {
        self.effect_levels.saturating_sub(1)
    }

    pub fn check_volume(&self, value: i64) -> Result<u16, CommandError> {
        let (min, max) = (i64::from(self.min_volume), i64::from(self.max_volume));
        if !(min..=max).contains(&value) {
            return Err(CommandError::OutOfRange {
                what: "volumen",
                value,
                min,
                max,
            });
        }
        Ok(value as u16)
    }

    pub fn check_effect(&self, value: i64) -> Result<u8, CommandError> {
        let max = i64::from(self.max_effect_level());
        if !(0..=max).contains(&value) {
            return Err(CommandError::OutOfRange {
                what: "nivel de efecto",
                value,
                min: 0,
                max,
            });
        }
        Ok(value as u8)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_domain_is_inclusive() {
        let limits = Limits::default();
        assert_eq!(limits.check_volume(0), Ok(0));
        assert_eq!(limits.check_volume(150), Ok(150));
        assert!(matches!(
            limits.check_volume(151),
            Err(CommandError::OutOfRange { max: 150, .. })
        ));
        assert!(limits.check_volume(-1).is_err());
    }

    #[test]
    fn effect_domain_follows_configured_levels() {
        let limits = Limits::default();
        assert_eq!(limits.check_effect(4), Ok(4));
        assert!(limits.check_effect(5).is_err());

        let narrow = Limits {
            effect_levels: 2,
            ..Limits::default()
        };
        assert_eq!(narrow.check_effect(1), Ok(1));
        assert!(narrow.check_effect(2).is_err());
    }

    #[test]
    fn filters_match_bass_ladder() {
        let flat = PlaybackSettings {
            volume: 100,
            effect_level: 0,
        };
        let heavy = PlaybackSettings {
            volume: 100,
            effect_level: 3,
        };
        assert_eq!(flat.ffmpeg_filter(), None);
        assert_eq!(heavy.ffmpeg_filter().as_deref(), Some("bass=g=6"));
        assert!((heavy.gain() - 1.0).abs() < f32::EPSILON);
    }
}
