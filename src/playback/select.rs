//! Choosing which track to play.

use std::collections::VecDeque;
use std::fmt::Write as _;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::PlayableTrack;

/// A menu choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSelection {
    /// Play the track at this 0-based index.
    One(usize),
    /// Play every track in order.
    All,
    Quit,
}

/// Input that is not a valid menu choice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no choice entered")]
    Empty,

    #[error("{value} is not between 1 and {count}")]
    OutOfRange { value: usize, count: usize },

    #[error("'{0}' is not a track number, 'a' or 'q'")]
    Invalid(String),
}

/// Parse one line of menu input for a list of `count` tracks.
///
/// Accepts `1..=count`, `a`/`all` and `q`/`quit`, case-insensitively.
///
/// # Errors
///
/// Anything else. Invalid input is never mapped to a default choice.
pub fn parse_selection(input: &str, count: usize) -> Result<TrackSelection, SelectionError> {
    let choice = input.trim().to_ascii_lowercase();
    match choice.as_str() {
        "" => Err(SelectionError::Empty),
        "a" | "all" => Ok(TrackSelection::All),
        "q" | "quit" => Ok(TrackSelection::Quit),
        digits if digits.chars().all(|c| c.is_ascii_digit()) => {
            let value: usize = digits
                .parse()
                .map_err(|_| SelectionError::Invalid(input.trim().to_owned()))?;
            if (1..=count).contains(&value) {
                Ok(TrackSelection::One(value - 1))
            } else {
                Err(SelectionError::OutOfRange { value, count })
            }
        }
        _ => Err(SelectionError::Invalid(input.trim().to_owned())),
    }
}

/// Source of menu choices.
#[async_trait]
pub trait TrackSelector: Send {
    /// Pick from `tracks` (never empty).
    ///
    /// Implementations must stay cancel-safe: the pipeline drops this
    /// future when the run is cancelled.
    async fn select(&mut self, tracks: &[PlayableTrack]) -> TrackSelection;

    /// Whether a person is choosing. Non-interactive selections play in
    /// the foreground because nobody is there to pick the next track.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Numbered menu fed by a channel of input lines (stdin in the CLI).
///
/// Re-prompts on invalid input. A closed channel counts as
/// [`TrackSelection::Quit`].
pub struct ConsoleSelector<W> {
    lines: mpsc::Receiver<String>,
    output: W,
}

impl<W: AsyncWrite + Unpin + Send> ConsoleSelector<W> {
    pub fn new(lines: mpsc::Receiver<String>, output: W) -> Self {
        Self { lines, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    async fn print(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }
}

impl ConsoleSelector<tokio::io::Stdout> {
    /// Selector on the process's stdin and stdout.
    ///
    /// Lines are read on a plain thread so a pending read never holds up
    /// runtime shutdown after a cancelled menu.
    pub fn stdio() -> Self {
        let (tx, rx) = mpsc::channel(1);
        let reader = std::thread::Builder::new()
            .name("menu-input".to_owned())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut line = String::new();
                loop {
                    line.clear();
                    match stdin.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            if tx.blocking_send(line.clone()).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("stdin read failed: {e}");
                            break;
                        }
                    }
                }
            });
        if let Err(e) = reader {
            warn!("menu input unavailable: {e}");
        }
        Self::new(rx, tokio::io::stdout())
    }
}

fn render_menu(tracks: &[PlayableTrack]) -> String {
    let mut menu = String::from("\nGenerated tracks:\n");
    for (i, entry) in tracks.iter().enumerate() {
        let track = &entry.track;
        let _ = write!(menu, "  {}. {}", i + 1, track.title);
        if let Some(duration) = track.duration_label() {
            let _ = write!(menu, " ({duration})");
        }
        if let Some(tags) = &track.tags {
            let _ = write!(menu, " [{tags}]");
        }
        menu.push('\n');
    }
    menu
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TrackSelector for ConsoleSelector<W> {
    async fn select(&mut self, tracks: &[PlayableTrack]) -> TrackSelection {
        if self.print(&render_menu(tracks)).await.is_err() {
            return TrackSelection::Quit;
        }
        let count = tracks.len();
        loop {
            let prompt = format!("Select track to play (1-{count}, a for all, q to quit): ");
            if self.print(&prompt).await.is_err() {
                return TrackSelection::Quit;
            }

            let Some(line) = self.lines.recv().await else {
                return TrackSelection::Quit;
            };
            match parse_selection(&line, count) {
                Ok(selection) => return selection,
                Err(e) => {
                    if self.print(&format!("Invalid choice: {e}\n")).await.is_err() {
                        return TrackSelection::Quit;
                    }
                }
            }
        }
    }
}

/// Replays a fixed list of choices, then quits.
#[derive(Debug, Default, Clone)]
pub struct FixedSelector {
    choices: VecDeque<TrackSelection>,
}

impl FixedSelector {
    pub fn new(choices: impl IntoIterator<Item = TrackSelection>) -> Self {
        Self {
            choices: choices.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TrackSelector for FixedSelector {
    async fn select(&mut self, tracks: &[PlayableTrack]) -> TrackSelection {
        match self.choices.pop_front() {
            Some(TrackSelection::One(i)) if i >= tracks.len() => TrackSelection::Quit,
            Some(choice) => choice,
            None => TrackSelection::Quit,
        }
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::tracks::Track;
    use std::time::Duration;

    /// A closed channel pre-filled with `lines`.
    fn scripted(lines: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.try_send(format!("{line}\n")).unwrap();
        }
        rx
    }

    fn entries(titles: &[&str]) -> Vec<PlayableTrack> {
        titles
            .iter()
            .map(|t| PlayableTrack {
                track: Track {
                    index: 0,
                    id: None,
                    title: (*t).to_owned(),
                    stream_url: Some(format!("https://cdn.example/{t}")),
                    final_url: None,
                    tags: Some("acoustic".into()),
                    duration: Some(125.0),
                    file_stem: (*t).to_owned(),
                },
                locator: format!("https://cdn.example/{t}"),
            })
            .collect()
    }

    #[test]
    fn parses_numbers_all_and_quit() {
        assert_eq!(parse_selection("1", 3).unwrap(), TrackSelection::One(0));
        assert_eq!(parse_selection(" 3\n", 3).unwrap(), TrackSelection::One(2));
        assert_eq!(parse_selection("A", 3).unwrap(), TrackSelection::All);
        assert_eq!(parse_selection("all", 3).unwrap(), TrackSelection::All);
        assert_eq!(parse_selection("q", 3).unwrap(), TrackSelection::Quit);
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(parse_selection("", 3), Err(SelectionError::Empty));
        assert_eq!(
            parse_selection("0", 3),
            Err(SelectionError::OutOfRange { value: 0, count: 3 })
        );
        assert_eq!(
            parse_selection("4", 3),
            Err(SelectionError::OutOfRange { value: 4, count: 3 })
        );
        assert!(matches!(parse_selection("-1", 3), Err(SelectionError::Invalid(_))));
        assert!(matches!(parse_selection("two", 3), Err(SelectionError::Invalid(_))));
        assert!(matches!(
            parse_selection("99999999999999999999999", 3),
            Err(SelectionError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn console_reprompts_until_valid() {
        let input = scripted(&["7", "foo", "", "2"]);
        let mut selector = ConsoleSelector::new(input, Vec::new());
        let choice = selector.select(&entries(&["One", "Two"])).await;
        assert_eq!(choice, TrackSelection::One(1));

        let output = selector.into_output();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("Select track to play (1-2").count(), 4);
        assert_eq!(text.matches("Invalid choice").count(), 3);
        assert!(text.contains("1. One (2:05) [acoustic]"));
    }

    #[tokio::test]
    async fn console_end_of_input_quits() {
        let mut selector = ConsoleSelector::new(scripted(&["bogus"]), Vec::new());
        assert_eq!(
            selector.select(&entries(&["One", "Two"])).await,
            TrackSelection::Quit
        );
    }

    #[tokio::test]
    async fn console_waits_for_input() {
        let (tx, rx) = mpsc::channel::<String>(1);
        let mut selector = ConsoleSelector::new(rx, Vec::new());
        let tracks = entries(&["One", "Two"]);

        let pending =
            tokio::time::timeout(Duration::from_millis(50), selector.select(&tracks)).await;
        assert!(pending.is_err());

        tx.send("1\n".to_owned()).await.unwrap();
        assert_eq!(selector.select(&tracks).await, TrackSelection::One(0));
    }

    #[tokio::test]
    async fn fixed_selector_replays_then_quits() {
        let tracks = entries(&["One", "Two"]);
        let mut selector = FixedSelector::new([TrackSelection::One(1), TrackSelection::One(5)]);
        assert!(!selector.is_interactive());
        assert_eq!(selector.select(&tracks).await, TrackSelection::One(1));
        assert_eq!(selector.select(&tracks).await, TrackSelection::Quit);
        assert_eq!(selector.select(&tracks).await, TrackSelection::Quit);
    }
}
