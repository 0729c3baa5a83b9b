//! Handing tracks to an external audio player.
//!
//! Players are an ordered list of [`PlayerProbe`]s. Every dispatch walks
//! the list and uses the first probe whose availability check passes, so
//! installing a player mid-session takes effect on the next track.

mod players;
mod select;

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::progress::{self, ProgressCallback, ProgressEvent};
use crate::tracks::Track;

pub use players::{DEFAULT_PLAYERS, default_probes, probe_for};
pub use select::{
    ConsoleSelector, FixedSelector, SelectionError, TrackSelection, TrackSelector,
    parse_selection,
};

/// What to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    /// Local path or URL.
    pub locator: String,
    /// Shown in the player's window title where supported.
    pub title: String,
    /// 0..=130, player scale.
    pub volume: u8,
}

/// Whether [`PlaybackDispatcher::play`] waits for the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Wait for the player to exit, bounded by the playback timeout.
    Blocking,
    /// Start the player and return its handle.
    Detached,
}

/// A track together with the locator it should be played from.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableTrack {
    pub track: Track,
    /// Downloaded path, or a URL when streaming.
    pub locator: String,
}

type AvailabilityCheck = Box<dyn Fn() -> bool + Send + Sync>;
type CommandBuilder = Box<dyn Fn(&PlaybackRequest) -> Command + Send + Sync>;

/// One candidate player: an availability check and a command builder.
pub struct PlayerProbe {
    name: String,
    available: AvailabilityCheck,
    command: CommandBuilder,
}

impl std::fmt::Debug for PlayerProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerProbe").field("name", &self.name).finish()
    }
}

impl PlayerProbe {
    pub fn new(
        name: impl Into<String>,
        available: impl Fn() -> bool + Send + Sync + 'static,
        command: impl Fn(&PlaybackRequest) -> Command + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            available: Box::new(available),
            command: Box::new(command),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_available(&self) -> bool {
        (self.available)()
    }

    pub fn command(&self, request: &PlaybackRequest) -> Command {
        (self.command)(request)
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub enum PlaybackOutcome {
    /// A blocking player exited on its own.
    Finished { player: String, success: bool },
    /// A detached player is running.
    Detached(DetachedPlayer),
}

/// Handle to a player running in the background.
///
/// The process is killed when the handle is dropped.
#[derive(Debug)]
pub struct DetachedPlayer {
    player: String,
    child: Child,
}

impl DetachedPlayer {
    pub fn player(&self) -> &str {
        &self.player
    }

    /// Whether the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the player if it is still running.
    pub async fn stop(mut self) {
        if self.is_running() {
            debug!(player = %self.player, "stopping player");
            if let Err(e) = self.child.kill().await {
                warn!(player = %self.player, "failed to stop player: {e}");
            }
        }
    }
}

/// Picks a player and runs it.
pub struct PlaybackDispatcher {
    probes: Vec<PlayerProbe>,
    volume: u8,
    timeout: Duration,
}

impl std::fmt::Debug for PlaybackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackDispatcher")
            .field("probes", &self.probes)
            .field("volume", &self.volume)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for PlaybackDispatcher {
    fn default() -> Self {
        Self::from_config(&PlaybackConfig::default())
    }
}

impl PlaybackDispatcher {
    pub fn new(probes: Vec<PlayerProbe>) -> Self {
        let defaults = PlaybackConfig::default();
        Self {
            probes,
            volume: defaults.volume,
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    /// Probes for the configured player names, in configured order.
    pub fn from_config(config: &PlaybackConfig) -> Self {
        let probes = if config.players.is_empty() {
            default_probes()
        } else {
            config.players.iter().map(|name| probe_for(name)).collect()
        };
        Self::new(probes)
            .with_volume(config.volume)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a request at the configured volume.
    pub fn request(&self, locator: impl Into<String>, title: impl Into<String>) -> PlaybackRequest {
        PlaybackRequest {
            locator: locator.into(),
            title: title.into(),
            volume: self.volume,
        }
    }

    /// Name of the player the next dispatch would use.
    pub fn available_player(&self) -> Option<&str> {
        self.probes
            .iter()
            .find(|p| p.is_available())
            .map(PlayerProbe::name)
    }

    /// Play `request` with the first available player.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NoPlayerAvailable`] carrying the locator when no
    /// probe passes; [`PlaybackError::Spawn`] when the process cannot be
    /// started; [`PlaybackError::Timeout`] when a blocking player outlives
    /// the playback budget (it is killed first).
    pub async fn play(
        &self,
        request: &PlaybackRequest,
        mode: PlaybackMode,
        callback: Option<&ProgressCallback>,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let Some(probe) = self.probes.iter().find(|p| p.is_available()) else {
            warn!(locator = %request.locator, "no audio player available");
            return Err(PlaybackError::NoPlayerAvailable {
                locator: request.locator.clone(),
            });
        };
        let player = probe.name().to_owned();

        let mut cmd = probe.command(request);
        cmd.kill_on_drop(true);
        if mode == PlaybackMode::Detached {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        info!(player = %player, locator = %request.locator, ?mode, "starting playback");
        let mut child = cmd.spawn().map_err(|e| PlaybackError::Spawn {
            player: player.clone(),
            message: e.to_string(),
        })?;
        progress::emit(
            callback,
            ProgressEvent::PlaybackStarted {
                player: player.clone(),
                locator: request.locator.clone(),
            },
        );

        match mode {
            PlaybackMode::Detached => Ok(PlaybackOutcome::Detached(DetachedPlayer { player, child })),
            PlaybackMode::Blocking => match tokio::time::timeout(self.timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    if !status.success() {
                        debug!(player = %player, %status, "player exited with failure status");
                    }
                    Ok(PlaybackOutcome::Finished {
                        player,
                        success: status.success(),
                    })
                }
                Ok(Err(e)) => Err(PlaybackError::Spawn {
                    player,
                    message: e.to_string(),
                }),
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(player = %player, "failed to stop player after timeout: {e}");
                    }
                    Err(PlaybackError::Timeout {
                        player,
                        secs: self.timeout.as_secs(),
                    })
                }
            },
        }
    }

    /// Offer `tracks` for playback.
    ///
    /// A single track plays in the foreground. For several tracks the
    /// selector is consulted until it quits: a single choice plays in the
    /// background (stopping any previous one) and the menu comes back; "all"
    /// plays every track in the foreground in order. Non-interactive
    /// selectors play single choices in the foreground.
    ///
    /// Returns the number of players started.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NoPlayerAvailable`] is returned immediately. Other
    /// playback errors are returned for a single track and logged when a
    /// menu is shown.
    pub async fn offer_tracks(
        &self,
        tracks: &[PlayableTrack],
        selector: &mut dyn TrackSelector,
        callback: Option<&ProgressCallback>,
    ) -> Result<usize, PlaybackError> {
        match tracks {
            [] => Ok(0),
            [only] => {
                let request = self.request(&only.locator, &only.track.title);
                self.play(&request, PlaybackMode::Blocking, callback).await?;
                Ok(1)
            }
            _ => self.run_menu(tracks, selector, callback).await,
        }
    }

    async fn run_menu(
        &self,
        tracks: &[PlayableTrack],
        selector: &mut dyn TrackSelector,
        callback: Option<&ProgressCallback>,
    ) -> Result<usize, PlaybackError> {
        let mut started = 0;
        let mut background: Option<DetachedPlayer> = None;

        let result = loop {
            match selector.select(tracks).await {
                TrackSelection::Quit => break Ok(started),
                TrackSelection::One(index) => {
                    let Some(entry) = tracks.get(index) else {
                        warn!(index, "selection out of range");
                        continue;
                    };
                    if let Some(previous) = background.take() {
                        previous.stop().await;
                    }
                    let mode = if selector.is_interactive() {
                        PlaybackMode::Detached
                    } else {
                        PlaybackMode::Blocking
                    };
                    let request = self.request(&entry.locator, &entry.track.title);
                    match self.play(&request, mode, callback).await {
                        Ok(PlaybackOutcome::Detached(player)) => {
                            started += 1;
                            background = Some(player);
                        }
                        Ok(PlaybackOutcome::Finished { .. }) => started += 1,
                        Err(e @ PlaybackError::NoPlayerAvailable { .. }) => break Err(e),
                        Err(e) => warn!(title = %entry.track.title, "playback failed: {e}"),
                    }
                }
                TrackSelection::All => {
                    if let Some(previous) = background.take() {
                        previous.stop().await;
                    }
                    for entry in tracks {
                        let request = self.request(&entry.locator, &entry.track.title);
                        match self.play(&request, PlaybackMode::Blocking, callback).await {
                            Ok(_) => started += 1,
                            Err(e @ PlaybackError::NoPlayerAvailable { .. }) => return Err(e),
                            Err(e) => warn!(title = %entry.track.title, "playback failed: {e}"),
                        }
                    }
                }
            }
        };

        if let Some(player) = background {
            player.stop().await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// A probe that runs `program args…` and records each locator.
    fn recording_probe(
        name: &str,
        program: &'static str,
        args: &'static [&'static str],
        log: Arc<Mutex<Vec<String>>>,
    ) -> PlayerProbe {
        let tag = name.to_owned();
        PlayerProbe::new(
            name,
            || true,
            move |req| {
                log.lock().unwrap().push(format!("{tag}:{}", req.locator));
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            },
        )
    }

    fn unavailable(name: &str) -> PlayerProbe {
        PlayerProbe::new(name, || false, |_| Command::new("false"))
    }

    fn playable(titles: &[&str]) -> Vec<PlayableTrack> {
        titles
            .iter()
            .map(|t| PlayableTrack {
                track: Track {
                    index: 0,
                    id: None,
                    title: (*t).to_owned(),
                    stream_url: None,
                    final_url: Some(format!("https://cdn.example/{t}.mp3")),
                    tags: None,
                    duration: None,
                    file_stem: (*t).to_owned(),
                },
                locator: format!("/music/{t}.mp3"),
            })
            .collect()
    }

    #[tokio::test]
    async fn first_available_probe_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = PlaybackDispatcher::new(vec![
            unavailable("mpv"),
            recording_probe("vlc", "true", &[], Arc::clone(&log)),
            recording_probe("ffplay", "true", &[], Arc::clone(&log)),
        ]);

        let request = dispatcher.request("/music/a.mp3", "A");
        let outcome = dispatcher
            .play(&request, PlaybackMode::Blocking, None)
            .await
            .unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Finished { ref player, success: true } if player == "vlc"));
        assert_eq!(*log.lock().unwrap(), vec!["vlc:/music/a.mp3"]);
    }

    #[tokio::test]
    async fn no_player_returns_locator() {
        let dispatcher = PlaybackDispatcher::new(vec![unavailable("mpv"), unavailable("vlc")]);
        let request = dispatcher.request("https://cdn.example/s/1", "Stream");
        let err = dispatcher
            .play(&request, PlaybackMode::Blocking, None)
            .await
            .unwrap_err();
        match err {
            PlaybackError::NoPlayerAvailable { locator } => {
                assert_eq!(locator, "https://cdn.example/s/1");
            }
            other => panic!("expected NoPlayerAvailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn availability_is_checked_on_every_dispatch() {
        let installed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&installed);
        let dispatcher = PlaybackDispatcher::new(vec![PlayerProbe::new(
            "late",
            move || flag.load(Ordering::SeqCst),
            |_| Command::new("true"),
        )]);
        let request = dispatcher.request("/music/a.mp3", "A");

        assert!(dispatcher.play(&request, PlaybackMode::Blocking, None).await.is_err());
        installed.store(true, Ordering::SeqCst);
        assert!(dispatcher.play(&request, PlaybackMode::Blocking, None).await.is_ok());
    }

    #[tokio::test]
    async fn blocking_playback_is_bounded() {
        let dispatcher = PlaybackDispatcher::new(vec![PlayerProbe::new(
            "slow",
            || true,
            |_| {
                let mut cmd = Command::new("sleep");
                cmd.arg("30");
                cmd
            },
        )])
        .with_timeout(Duration::from_millis(200));

        let request = dispatcher.request("/music/a.mp3", "A");
        let err = dispatcher
            .play(&request, PlaybackMode::Blocking, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Timeout { ref player, .. } if player == "slow"));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let dispatcher = PlaybackDispatcher::new(vec![PlayerProbe::new(
            "ghost",
            || true,
            |_| Command::new("/nonexistent/voice2music-player"),
        )]);
        let request = dispatcher.request("/music/a.mp3", "A");
        let err = dispatcher
            .play(&request, PlaybackMode::Blocking, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Spawn { .. }));
    }

    #[tokio::test]
    async fn single_track_plays_without_menu() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher =
            PlaybackDispatcher::new(vec![recording_probe("mpv", "true", &[], Arc::clone(&log))]);
        let mut selector = FixedSelector::new([]);

        let started = dispatcher
            .offer_tracks(&playable(&["Solo"]), &mut selector, None)
            .await
            .unwrap();
        assert_eq!(started, 1);
        assert_eq!(*log.lock().unwrap(), vec!["mpv:/music/Solo.mp3"]);
    }

    #[tokio::test]
    async fn play_all_runs_tracks_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher =
            PlaybackDispatcher::new(vec![recording_probe("mpv", "true", &[], Arc::clone(&log))]);
        let mut selector = FixedSelector::new([TrackSelection::All]);

        let started = dispatcher
            .offer_tracks(&playable(&["One", "Two", "Three"]), &mut selector, None)
            .await
            .unwrap();
        assert_eq!(started, 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["mpv:/music/One.mp3", "mpv:/music/Two.mp3", "mpv:/music/Three.mp3"]
        );
    }

    #[tokio::test]
    async fn interactive_choice_detaches_and_menu_returns() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = PlaybackDispatcher::new(vec![recording_probe(
            "mpv",
            "sleep",
            &["30"],
            Arc::clone(&log),
        )]);
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        for line in ["2\n", "nope\n", "1\n", "q\n"] {
            tx.try_send(line.to_owned()).unwrap();
        }
        let mut selector = ConsoleSelector::new(rx, Vec::new());

        let started = tokio::time::timeout(
            Duration::from_secs(10),
            dispatcher.offer_tracks(&playable(&["One", "Two"]), &mut selector, None),
        )
        .await
        .expect("menu must not block on a detached player")
        .unwrap();

        assert_eq!(started, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["mpv:/music/Two.mp3", "mpv:/music/One.mp3"]
        );
        let output = selector.into_output();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("Invalid choice").count(), 1);
    }

    #[tokio::test]
    async fn menu_surfaces_missing_player() {
        let dispatcher = PlaybackDispatcher::new(vec![unavailable("mpv")]);
        let mut selector = FixedSelector::new([TrackSelection::One(0)]);
        let err = dispatcher
            .offer_tracks(&playable(&["One", "Two"]), &mut selector, None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, PlaybackError::NoPlayerAvailable { ref locator } if locator == "/music/One.mp3")
        );
    }

    #[test]
    fn configured_players_keep_their_order() {
        let config = PlaybackConfig {
            players: vec!["ffplay".into(), "mpv".into()],
            volume: 40,
            timeout_secs: 5,
        };
        let dispatcher = PlaybackDispatcher::from_config(&config);
        let names: Vec<_> = dispatcher.probes.iter().map(PlayerProbe::name).collect();
        assert_eq!(names, vec!["ffplay", "mpv"]);
        assert_eq!(dispatcher.request("x", "y").volume, 40);
    }
}
