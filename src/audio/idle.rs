use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::player::SessionManager;

const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(30);

/// Barrido periódico que desconecta las sesiones inactivas.
pub struct IdleMonitor {
    sessions: Arc<SessionManager>,
    threshold: Duration,
    cancel: CancellationToken,
}

impl IdleMonitor {
    pub fn new(sessions: Arc<SessionManager>, threshold: Duration, cancel: CancellationToken) -> Self {
        Self {
            sessions,
            threshold,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let period = self.threshold.min(MAX_SWEEP_PERIOD);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "💤 Desconexión por inactividad tras {} (revisión cada {})",
            humantime::format_duration(self.threshold),
            humantime::format_duration(period)
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.sessions.sweep_idle(self.threshold).await;
                    if removed > 0 {
                        info!("🧹 {} sesiones inactivas desconectadas", removed);
                    }
                }
            }
        }

        debug!("Monitor de inactividad detenido");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{channel, deps, guild, test_config};
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn disconnects_idle_sessions_until_cancelled() {
        let (deps, fakes) = deps(test_config());
        let sessions = Arc::new(SessionManager::new(deps));
        sessions.session(guild()).connect(channel(1)).await.unwrap();

        let cancel = CancellationToken::new();
        let monitor =
            IdleMonitor::new(sessions.clone(), Duration::from_secs(300), cancel.clone()).spawn();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(sessions.get(guild()).is_some());

        tokio::time::sleep(Duration::from_secs(240)).await;
        assert_eq!(fakes.next_event().await, "disconnected:Idle");
        assert!(sessions.get(guild()).is_none());

        cancel.cancel();
        monitor.await.unwrap();
    }
}
