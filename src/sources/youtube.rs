use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{is_url, ResolvedTrack, Resolver, SearchResult};
use crate::error::ResolveError;

/// Línea `ERROR:` de yt-dlp, sin el extractor ni el id del video.
const ERROR_LINE: &str = r"(?m)^ERROR:\s*(?:\[[^\]]+\]\s*)?(?:[\w-]+:\s*)?(.+)$";

/// Resolutor basado en yt-dlp
pub struct YtDlpResolver {
    binary: String,
    error_pattern: Regex,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp (`--dump-single-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

/// Entrada de `--flat-playlist`: sin stream, sólo lo necesario para listarla.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpSearch {
    #[serde(default)]
    entries: Vec<Option<YtDlpEntry>>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, max_concurrent: usize) -> anyhow::Result<Self> {
        Ok(Self {
            binary: binary.into(),
            error_pattern: Regex::new(ERROR_LINE)?,
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
        })
    }

    /// Verifica que yt-dlp esté instalado y responda
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp --version falló");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Las búsquedas de texto libre se resuelven al primer resultado.
    fn target_for(locator: &str) -> String {
        if is_url(locator) {
            locator.to_string()
        } else {
            format!("ytsearch1:{}", locator)
        }
    }

    fn search_target(query: &str, limit: usize) -> String {
        format!("ytsearch{}:{}", limit, query)
    }

    fn parse_output(stdout: &str) -> Result<ResolvedTrack, ResolveError> {
        let info: YtDlpInfo = serde_json::from_str(stdout.trim())
            .map_err(|e| ResolveError::Failed(format!("respuesta de yt-dlp inválida: {}", e)))?;
        Self::info_to_resolved(info)
    }

    /// Si es una playlist se toma el primer elemento.
    fn info_to_resolved(info: YtDlpInfo) -> Result<ResolvedTrack, ResolveError> {
        let info = match info.entries {
            Some(entries) => entries.into_iter().next().ok_or(ResolveError::NotFound)?,
            None => info,
        };

        let title = info
            .title
            .unwrap_or_else(|| "Título desconocido".to_string());

        let stream_url = info
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ResolveError::Unplayable(format!("`{}` no tiene URL de audio", title)))?;

        Ok(ResolvedTrack {
            stream_url,
            title,
            duration: seconds(info.duration),
            uploader: info.uploader.or(info.channel),
            webpage_url: info.webpage_url,
            thumbnail: info.thumbnail,
        })
    }

    /// Los resultados sin enlace se descartan; el id de YouTube basta para
    /// reconstruirlo.
    fn parse_search_output(stdout: &str) -> Result<Vec<SearchResult>, ResolveError> {
        let search: YtDlpSearch = serde_json::from_str(stdout.trim())
            .map_err(|e| ResolveError::Failed(format!("respuesta de yt-dlp inválida: {}", e)))?;

        let results: Vec<SearchResult> = search
            .entries
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let url = entry
                    .webpage_url
                    .or(entry.url)
                    .filter(|url| is_url(url))
                    .or_else(|| {
                        entry
                            .id
                            .map(|id| format!("https://www.youtube.com/watch?v={}", id))
                    })?;
                Some(SearchResult {
                    title: entry
                        .title
                        .unwrap_or_else(|| "Título desconocido".to_string()),
                    url,
                    duration: seconds(entry.duration),
                    uploader: entry.uploader.or(entry.channel),
                })
            })
            .collect();

        if results.is_empty() {
            return Err(ResolveError::NotFound);
        }
        Ok(results)
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Failed(e.to_string()))?;

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolveError::Failed(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.classify_failure(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn classify_failure(&self, stderr: &str) -> ResolveError {
        let message = self
            .error_pattern
            .captures(stderr)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| stderr.lines().last().unwrap_or("sin detalles").trim().to_string());

        let lower = message.to_lowercase();
        if lower.contains("unavailable")
            || lower.contains("not found")
            || lower.contains("no video results")
            || lower.contains("unsupported url")
            || lower.contains("404")
        {
            ResolveError::NotFound
        } else if lower.contains("drm") || lower.contains("requested format is not available") {
            ResolveError::Unplayable(message)
        } else {
            ResolveError::Failed(message)
        }
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, locator: &str) -> Result<ResolvedTrack, ResolveError> {
        let target = Self::target_for(locator);
        let started = Instant::now();
        debug!("📊 Ejecutando yt-dlp para: {}", target);

        let stdout = self
            .run(&[
                "--dump-single-json",
                "--no-warnings",
                "--no-playlist",
                "--playlist-items",
                "1",
                "-f",
                "bestaudio/best",
                target.as_str(),
            ])
            .await
            .inspect_err(|e| warn!("❌ yt-dlp falló para {}: {}", locator, e))?;

        let resolved = Self::parse_output(&stdout)?;
        info!(
            "✅ Extracción exitosa en {:.2}s: {}",
            started.elapsed().as_secs_f64(),
            resolved.title
        );
        Ok(resolved)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ResolveError> {
        let target = Self::search_target(query, limit);
        debug!("📊 Buscando en yt-dlp: {}", target);

        let stdout = self
            .run(&["--flat-playlist", "--dump-single-json", "--no-warnings", target.as_str()])
            .await
            .inspect_err(|e| warn!("❌ Búsqueda fallida para {}: {}", query, e))?;

        let results = Self::parse_search_output(&stdout)?;
        info!("🔍 {} resultados para: {}", results.len(), query);
        Ok(results)
    }

    fn source_name(&self) -> &'static str {
        "yt-dlp"
    }
}

fn seconds(duration: Option<f64>) -> Option<Duration> {
    duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn search_text_becomes_ytsearch() {
        assert_eq!(YtDlpResolver::target_for("lofi beats"), "ytsearch1:lofi beats");
        assert_eq!(
            YtDlpResolver::target_for("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn parses_single_video() {
        let json = r#"{
            "title": "Song A",
            "duration": 180.0,
            "uploader": "Artist",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "url": "https://rr1.googlevideo.com/videoplayback?id=abc"
        }"#;

        let track = YtDlpResolver::parse_output(json).unwrap();
        assert_eq!(track.title, "Song A");
        assert_eq!(track.duration, Some(Duration::from_secs(180)));
        assert_eq!(track.uploader.as_deref(), Some("Artist"));
    }

    #[test]
    fn search_results_take_first_entry() {
        let json = r#"{
            "title": "lofi",
            "entries": [
                {"title": "First", "url": "https://cdn.test/1", "channel": "Chan"},
                {"title": "Second", "url": "https://cdn.test/2"}
            ]
        }"#;

        let track = YtDlpResolver::parse_output(json).unwrap();
        assert_eq!(track.title, "First");
        assert_eq!(track.uploader.as_deref(), Some("Chan"));
    }

    #[test]
    fn empty_playlist_is_not_found() {
        let json = r#"{"title": "empty", "entries": []}"#;
        assert_eq!(YtDlpResolver::parse_output(json), Err(ResolveError::NotFound));
    }

    #[test]
    fn entry_without_stream_is_unplayable() {
        let json = r#"{"title": "Live thing", "duration": null}"#;
        assert!(matches!(
            YtDlpResolver::parse_output(json),
            Err(ResolveError::Unplayable(_))
        ));
    }

    #[test]
    fn search_asks_for_n_results() {
        assert_eq!(YtDlpResolver::search_target("lofi beats", 5), "ytsearch5:lofi beats");
    }

    #[test]
    fn parses_flat_search_results() {
        let json = r#"{
            "title": "lofi",
            "entries": [
                {"id": "abc", "title": "First", "url": "https://www.youtube.com/watch?v=abc",
                 "duration": 215.0, "channel": "Chan"},
                {"id": "def", "title": "Second", "duration": null},
                null,
                {"title": "No link"}
            ]
        }"#;

        let results = YtDlpResolver::parse_search_output(json).unwrap();
        assert_eq!(
            results,
            vec![
                SearchResult {
                    title: "First".to_string(),
                    url: "https://www.youtube.com/watch?v=abc".to_string(),
                    duration: Some(Duration::from_secs(215)),
                    uploader: Some("Chan".to_string()),
                },
                SearchResult {
                    title: "Second".to_string(),
                    url: "https://www.youtube.com/watch?v=def".to_string(),
                    duration: None,
                    uploader: None,
                },
            ]
        );
    }

    #[test]
    fn empty_search_is_not_found() {
        let json = r#"{"title": "zzzz", "entries": []}"#;
        assert_eq!(
            YtDlpResolver::parse_search_output(json),
            Err(ResolveError::NotFound)
        );
    }

    #[test]
    fn classifies_stderr() {
        let resolver = YtDlpResolver::new("yt-dlp", 1).unwrap();
        assert_eq!(
            resolver.classify_failure("ERROR: [youtube] abc: Video unavailable"),
            ResolveError::NotFound
        );
        assert_eq!(
            resolver.classify_failure("ERROR: unable to download webpage: timed out"),
            ResolveError::Failed("unable to download webpage: timed out".into())
        );
    }
}
