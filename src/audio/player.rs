use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use super::session::{DisconnectReason, Session, SessionDeps, TerminateOutcome};

/// Registro de sesiones por guild.
///
/// Lookups for different guilds never contend on the same lock; all playback
/// state lives inside each [`Session`].
pub struct SessionManager {
    sessions: DashMap<GuildId, Arc<Session>>,
    deps: Arc<SessionDeps>,
}

impl SessionManager {
    pub fn new(deps: Arc<SessionDeps>) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// Sesión viva de la guild, creando una nueva si no había o si terminó.
    pub fn session(&self, guild_id: GuildId) -> Arc<Session> {
        let mut entry = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| Session::new(guild_id, self.deps.clone()));

        if entry.is_terminated() {
            debug!("♻️ Reemplazando sesión terminada de guild {}", guild_id);
            *entry = Session::new(guild_id, self.deps.clone());
        }
        entry.clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Termina y olvida la sesión de la guild. `None` si no existía.
    pub async fn terminate(
        &self,
        guild_id: GuildId,
        reason: DisconnectReason,
    ) -> Option<TerminateOutcome> {
        let (_, session) = self.sessions.remove(&guild_id)?;
        Some(session.terminate(reason).await)
    }

    /// Termina las sesiones inactivas por más de `threshold`.
    ///
    /// Sessions whose call still reports audio are left alone. Returns how many
    /// sessions were removed.
    pub async fn sweep_idle(&self, threshold: Duration) -> usize {
        let candidates: Vec<(GuildId, Arc<Session>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut removed = 0;
        for (guild_id, session) in candidates {
            if !session.is_terminated() {
                if session.voice_active().await {
                    continue;
                }
                if !session.terminate_if_idle(threshold).await {
                    continue;
                }
            }

            if self
                .sessions
                .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &session))
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    /// Termina todas las sesiones (apagado del bot).
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.sessions.clear();

        info!("🛑 Cerrando {} sesiones", sessions.len());
        join_all(
            sessions
                .iter()
                .map(|session| session.terminate(DisconnectReason::Shutdown)),
        )
        .await;
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{channel, deps, guild, test_config, user};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn one_session_per_guild() {
        let (deps, _fakes) = deps(test_config());
        let manager = SessionManager::new(deps);

        let first = manager.session(guild());
        let again = manager.session(guild());
        let other = manager.session(GuildId::new(99));

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn terminated_sessions_are_replaced() {
        let (deps, fakes) = deps(test_config());
        let manager = SessionManager::new(deps);

        let old = manager.session(guild());
        old.terminate(DisconnectReason::VoiceLost).await;

        let fresh = manager.session(guild());
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!fresh.is_terminated());
        assert_eq!(fakes.drain(), vec!["disconnected:VoiceLost"]);
    }

    #[tokio::test]
    async fn terminate_forgets_the_session() {
        let (deps, fakes) = deps(test_config());
        let manager = SessionManager::new(deps);
        manager.session(guild()).connect(channel(1)).await.unwrap();

        assert_eq!(
            manager.terminate(guild(), DisconnectReason::Requested).await,
            Some(TerminateOutcome::Terminated)
        );
        assert_eq!(manager.terminate(guild(), DisconnectReason::Requested).await, None);
        assert!(manager.get(guild()).is_none());
        assert_eq!(fakes.gateway.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_idle_sessions() {
        let (deps, fakes) = deps(test_config());
        let manager = SessionManager::new(deps);

        let idle = manager.session(guild());
        idle.connect(channel(1)).await.unwrap();
        let busy = manager.session(GuildId::new(99));
        busy.connect(channel(2)).await.unwrap();
        busy.enqueue("Song A", user()).await.unwrap();
        fakes.drain();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(manager.sweep_idle(Duration::from_secs(300)).await, 1);

        assert!(idle.is_terminated());
        assert!(manager.get(guild()).is_none());
        assert!(manager.get(GuildId::new(99)).is_some());
        assert_eq!(fakes.drain(), vec!["disconnected:Idle"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_skips_calls_with_audio() {
        let (deps, fakes) = deps(test_config());
        let manager = SessionManager::new(deps);
        manager.session(guild()).connect(channel(1)).await.unwrap();
        fakes.gateway.set_active(true);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(manager.sweep_idle(Duration::from_secs(300)).await, 0);
        assert!(manager.get(guild()).is_some());
    }

    #[tokio::test]
    async fn shutdown_terminates_everything() {
        let (deps, fakes) = deps(test_config());
        let manager = SessionManager::new(deps);
        let a = manager.session(guild());
        let b = manager.session(GuildId::new(99));

        manager.shutdown().await;

        assert!(a.is_terminated() && b.is_terminated());
        assert!(manager.is_empty());
        assert_eq!(
            fakes.drain(),
            vec!["disconnected:Shutdown", "disconnected:Shutdown"]
        );
    }
}
