//! Built-in player probes.
//!
//! Each probe pairs a `PATH` lookup with the argument list for one
//! command-line player. Players are headless: video output and GUI windows
//! are disabled where the player supports it.

use tokio::process::Command;

use super::{PlaybackRequest, PlayerProbe};

/// Player programs tried in order when none are configured.
pub const DEFAULT_PLAYERS: &[&str] = &["mpv", "vlc", "mplayer", "ffplay"];

/// Probe for a named player.
///
/// Known players get their own flags. Any other name is treated as a
/// program that takes the locator as its only argument.
pub fn probe_for(name: &str) -> PlayerProbe {
    match name {
        "mpv" => program_probe("mpv", |req| {
            vec![
                req.locator.clone(),
                format!("--title=voice2music: {}", req.title),
                "--no-video".to_owned(),
                format!("--volume={}", req.volume),
            ]
        }),
        "vlc" => program_probe("vlc", |req| {
            vec![
                req.locator.clone(),
                "--intf".to_owned(),
                "dummy".to_owned(),
                "--no-video".to_owned(),
                "--play-and-exit".to_owned(),
                // VLC's volume scale is 0..=512 with 256 at 100%.
                "--volume".to_owned(),
                (u32::from(req.volume) * 256 / 100).to_string(),
            ]
        }),
        "mplayer" => program_probe("mplayer", |req| {
            vec![
                req.locator.clone(),
                "-really-quiet".to_owned(),
                "-volume".to_owned(),
                req.volume.to_string(),
            ]
        }),
        "ffplay" => program_probe("ffplay", |req| {
            vec![
                req.locator.clone(),
                "-nodisp".to_owned(),
                "-autoexit".to_owned(),
                "-loglevel".to_owned(),
                "error".to_owned(),
                "-volume".to_owned(),
                req.volume.min(100).to_string(),
            ]
        }),
        other => program_probe(other, |_| Vec::new()),
    }
}

/// Probes for [`DEFAULT_PLAYERS`], in order.
pub fn default_probes() -> Vec<PlayerProbe> {
    DEFAULT_PLAYERS.iter().copied().map(probe_for).collect()
}

/// A probe that runs `program` when it is on `PATH`.
///
/// For unknown players the argument builder returns an empty list and the
/// locator is appended as the sole argument.
fn program_probe<F>(program: &str, args: F) -> PlayerProbe
where
    F: Fn(&PlaybackRequest) -> Vec<String> + Send + Sync + 'static,
{
    let lookup = program.to_owned();
    let exe = program.to_owned();
    PlayerProbe::new(
        program,
        move || which::which(&lookup).is_ok(),
        move |req| {
            let mut cmd = Command::new(&exe);
            let argv = args(req);
            if argv.is_empty() {
                cmd.arg(&req.locator);
            } else {
                cmd.args(argv);
            }
            cmd
        },
    )
}
