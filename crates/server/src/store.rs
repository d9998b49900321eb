//! session store owning the lobby and contest actors.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use log::info;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time;

use diceroyale_core::config::ContestConfig;
use diceroyale_core::session::SessionKey;

use crate::contest::Contest;
use crate::lobby::Lobby;

/// How often dead sessions are swept out of the store.
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// One coordinator object owning every live session, injected into the
/// connection handlers. Sessions are created lazily and independent of
/// each other; a fault in one never reaches another.
#[derive(Debug)]
pub struct SessionStore {
    contest_config: ContestConfig,
    lobbies: Mutex<AHashMap<SessionKey, Lobby>>,
    contests: Mutex<AHashMap<SessionKey, Contest>>,
}

impl SessionStore {
    /// Creates an empty store; `contest_config` applies to every contest.
    #[must_use]
    pub fn new(contest_config: ContestConfig) -> Self {
        Self {
            contest_config,
            lobbies: Mutex::new(AHashMap::new()),
            contests: Mutex::new(AHashMap::new()),
        }
    }

    /// Handle to the lobby for `key`, created on first use.
    pub fn lobby(&self, key: &SessionKey) -> Lobby {
        let mut lobbies = self.lobbies.lock();
        // A stopped actor (deserted lobby) is replaced by a fresh one so a
        // returning player gets an empty lobby, not a dead channel.
        if let Some(lobby) = lobbies.get(key) {
            if !lobby.is_closed() {
                return lobby.clone();
            }
        }
        info!("creating lobby {key}");
        let lobby = Lobby::spawn(key.clone());
        lobbies.insert(key.clone(), lobby.clone());
        lobby
    }

    /// Handle to the lobby for `key` if one is live.
    pub fn find_lobby(&self, key: &SessionKey) -> Option<Lobby> {
        let lobbies = self.lobbies.lock();
        lobbies.get(key).filter(|l| !l.is_closed()).cloned()
    }

    /// Handle to the contest for `key`, created on first use.
    pub fn contest(&self, key: &SessionKey) -> Contest {
        let mut contests = self.contests.lock();
        if let Some(contest) = contests.get(key) {
            if !contest.is_closed() {
                return contest.clone();
            }
        }
        info!("creating contest {key}");
        let contest = Contest::spawn(key.clone(), self.contest_config.clone());
        contests.insert(key.clone(), contest.clone());
        contest
    }

    /// Handle to the contest for `key` if one is live.
    pub fn find_contest(&self, key: &SessionKey) -> Option<Contest> {
        let contests = self.contests.lock();
        contests.get(key).filter(|c| !c.is_closed()).cloned()
    }

    /// Number of live lobbies.
    #[must_use]
    pub fn lobby_count(&self) -> usize {
        self.lobbies.lock().len()
    }

    /// Spawns the background reaper. Lobby actors stop themselves once all
    /// participants are disconnected (their own tick covers a lost leave
    /// event); contests park themselves idle-empty after completing. The
    /// sweep here only drops the dead handles so abandoned session keys do
    /// not accumulate.
    pub fn spawn_reaper(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(REAPER_INTERVAL);
            loop {
                tokio::select! {
                    _ = tick.tick() => store.sweep(),
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// Drops handles for stopped lobbies and idle contests.
    pub fn sweep(&self) {
        let mut lobbies = self.lobbies.lock();
        let before = lobbies.len();
        lobbies.retain(|_, lobby| !lobby.is_closed());
        let reaped = before - lobbies.len();
        if reaped > 0 {
            info!("reaped {reaped} deserted lobbies");
        }
        drop(lobbies);

        let mut contests = self.contests.lock();
        // Dropping the last handle closes the command channel; the actor
        // observes that and stops.
        contests.retain(|_, contest| !contest.is_closed() && !contest.is_parked());
    }
}
