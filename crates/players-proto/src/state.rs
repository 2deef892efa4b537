//! Player list and focus, as owned by the primary instance.
//!
//! `PlayerRegistry` is plain data: the primary's core loop is its only
//! writer, so nothing here is locked.  Control operations go through the
//! [`PlayerControl`] seam so the registry never talks to a backend directly.
use std::fmt::Write as _;

/// One controllable playback source.  Positions and lengths are in
/// microseconds; `-1` means unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackSource {
    pub name: String,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub playing: bool,
    pub position: i64,
    pub length: i64,
    /// Decoded from a data frame rather than read from a live backend.
    /// Such a source has no control handle.
    pub duplicate: bool,
}

impl PlaybackSource {
    pub fn status_label(&self) -> &'static str {
        if self.playing {
            "Playing"
        } else {
            "Paused"
        }
    }
}

/// Control operations a backend exposes per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Next,
    Previous,
    Toggle,
}

/// Backend seam for control operations, addressed by player name.
pub trait PlayerControl {
    fn send(&self, player: &str, action: Control) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: Vec<PlaybackSource>,
    focus: usize,
}

impl PlayerRegistry {
    pub fn with_players(players: Vec<PlaybackSource>) -> Self {
        Self { players, focus: 0 }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    #[cfg(test)]
    fn sources(&self) -> &[PlaybackSource] {
        &self.players
    }

    pub fn current(&self) -> Option<&PlaybackSource> {
        self.players.get(self.focus)
    }

    /// Rotate focus forward.  Returns true when focus moved and listeners
    /// should re-render.
    pub fn focus_next(&mut self) -> bool {
        let len = self.players.len();
        if len <= 1 {
            return false;
        }
        self.focus = (self.focus + 1) % len;
        true
    }

    pub fn focus_previous(&mut self) -> bool {
        let len = self.players.len();
        if len <= 1 {
            return false;
        }
        self.focus = if self.focus == 0 {
            len - 1
        } else {
            self.focus - 1
        };
        true
    }

    /// Forward `action` to the focused player.  Returns false when there was
    /// nothing to control.
    pub fn control<C: PlayerControl + ?Sized>(
        &self,
        ctl: &C,
        action: Control,
    ) -> anyhow::Result<bool> {
        match self.current() {
            Some(player) if !player.duplicate => {
                ctl.send(&player.name, action)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn control_next<C: PlayerControl + ?Sized>(&self, ctl: &C) -> anyhow::Result<bool> {
        self.control(ctl, Control::Next)
    }

    pub fn control_previous<C: PlayerControl + ?Sized>(&self, ctl: &C) -> anyhow::Result<bool> {
        self.control(ctl, Control::Previous)
    }

    pub fn control_toggle<C: PlayerControl + ?Sized>(&self, ctl: &C) -> anyhow::Result<bool> {
        self.control(ctl, Control::Toggle)
    }

    /// Replace the list with a fresh enumeration.  Focus follows the same
    /// player by name; if it vanished, focus falls back to 0.
    pub fn reload(&mut self, players: Vec<PlaybackSource>) {
        let focused = self.current().map(|p| p.name.clone());
        self.players = players;
        self.focus = focused
            .and_then(|name| self.players.iter().position(|p| p.name == name))
            .unwrap_or(0);
    }

    /// Autofocus: bring a playing player to the front and focus it.  A
    /// focused player that is already playing keeps its place.
    pub fn sort_by_priority(&mut self) {
        if !self.players.iter().any(|p| p.playing) {
            return;
        }
        let focus = self.focus;
        let mut ranked: Vec<(usize, PlaybackSource)> =
            std::mem::take(&mut self.players).into_iter().enumerate().collect();
        ranked.sort_by_key(|(idx, p)| (!p.playing, *idx != focus));
        self.players = ranked.into_iter().map(|(_, p)| p).collect();
        self.focus = 0;
    }

    /// Listing for the `list` command.
    pub fn describe(&self) -> String {
        if self.players.is_empty() {
            return "No players found.\n".to_string();
        }
        let mut out = String::new();
        for (idx, p) in self.players.iter().enumerate() {
            let marker = if idx == self.focus { '*' } else { ' ' };
            let _ = write!(out, "{} {}: {} ({})", marker, idx, p.name, p.status_label());
            match (p.artist.is_empty(), p.title.is_empty()) {
                (true, true) => {}
                (false, true) => {
                    let _ = write!(out, " {}", p.artist);
                }
                (true, false) => {
                    let _ = write!(out, " {}", p.title);
                }
                (false, false) => {
                    let _ = write!(out, " {} - {}", p.artist, p.title);
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn player(name: &str, playing: bool) -> PlaybackSource {
        PlaybackSource {
            name: name.to_string(),
            artist: format!("{} artist", name),
            title: format!("{} title", name),
            playing,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct Recorder(RefCell<Vec<(String, Control)>>);

    impl PlayerControl for Recorder {
        fn send(&self, player: &str, action: Control) -> anyhow::Result<()> {
            self.0.borrow_mut().push((player.to_string(), action));
            Ok(())
        }
    }

    #[test]
    fn test_focus_rotation_is_circular() {
        let mut reg = PlayerRegistry::with_players(vec![
            player("a", false),
            player("b", false),
            player("c", false),
        ]);
        for _ in 0..3 {
            assert!(reg.focus_next());
        }
        assert_eq!(reg.focus(), 0);
        for _ in 0..3 {
            assert!(reg.focus_previous());
        }
        assert_eq!(reg.focus(), 0);
    }

    #[test]
    fn test_focus_previous_inverts_next() {
        let mut reg = PlayerRegistry::with_players(vec![player("a", false), player("b", false)]);
        reg.focus_previous();
        assert_eq!(reg.focus(), 1);
        assert_eq!(reg.current().unwrap().name, "b");
        reg.focus_next();
        assert_eq!(reg.focus(), 0);
    }

    #[test]
    fn test_single_player_rotation_is_noop() {
        let mut reg = PlayerRegistry::with_players(vec![player("only", true)]);
        assert!(!reg.focus_next());
        assert!(!reg.focus_previous());
        assert_eq!(reg.focus(), 0);
    }

    #[test]
    fn test_empty_registry_is_neutral() {
        let mut reg = PlayerRegistry::with_players(Vec::new());
        let rec = Recorder::default();
        assert!(reg.current().is_none());
        assert!(!reg.focus_next());
        assert!(!reg.focus_previous());
        assert!(!reg.control_toggle(&rec).unwrap());
        reg.sort_by_priority();
        reg.reload(Vec::new());
        assert_eq!(reg.focus(), 0);
        assert_eq!(reg.describe(), "No players found.\n");
        assert!(rec.0.borrow().is_empty());
    }

    #[test]
    fn test_control_targets_focused_player() {
        let mut reg = PlayerRegistry::with_players(vec![player("a", false), player("b", true)]);
        reg.focus_next();
        let rec = Recorder::default();
        assert!(reg.control_next(&rec).unwrap());
        assert!(reg.control_previous(&rec).unwrap());
        assert!(reg.control_toggle(&rec).unwrap());
        assert_eq!(
            *rec.0.borrow(),
            vec![
                ("b".to_string(), Control::Next),
                ("b".to_string(), Control::Previous),
                ("b".to_string(), Control::Toggle),
            ]
        );
        assert_eq!(reg.focus(), 1);
    }

    #[test]
    fn test_control_skips_duplicates() {
        let mut mirrored = player("remote", true);
        mirrored.duplicate = true;
        let reg = PlayerRegistry::with_players(vec![mirrored]);
        let rec = Recorder::default();
        assert!(!reg.control_toggle(&rec).unwrap());
        assert!(rec.0.borrow().is_empty());
    }

    #[test]
    fn test_reload_keeps_focus_on_same_player() {
        let mut reg = PlayerRegistry::with_players(vec![
            player("a", false),
            player("b", false),
            player("c", false),
        ]);
        reg.focus_next();
        reg.focus_next();
        assert_eq!(reg.current().unwrap().name, "c");

        reg.reload(vec![player("c", true), player("a", false)]);
        assert_eq!(reg.focus(), 0);
        assert_eq!(reg.current().unwrap().name, "c");
        assert!(reg.current().unwrap().playing);
    }

    #[test]
    fn test_reload_clamps_when_focused_player_vanishes() {
        let mut reg = PlayerRegistry::with_players(vec![
            player("a", false),
            player("b", false),
            player("c", false),
        ]);
        reg.focus_previous();
        assert_eq!(reg.focus(), 2);
        reg.reload(vec![player("a", false)]);
        assert_eq!(reg.focus(), 0);
        assert_eq!(reg.current().unwrap().name, "a");
    }

    #[test]
    fn test_sort_by_priority_brings_playing_to_front() {
        let mut reg = PlayerRegistry::with_players(vec![
            player("a", false),
            player("b", true),
            player("c", false),
        ]);
        reg.sort_by_priority();
        assert_eq!(reg.focus(), 0);
        let names: Vec<_> = reg.sources().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_sort_by_priority_keeps_playing_focus() {
        let mut reg = PlayerRegistry::with_players(vec![
            player("a", true),
            player("b", true),
        ]);
        reg.focus_next();
        reg.sort_by_priority();
        assert_eq!(reg.current().unwrap().name, "b");
    }

    #[test]
    fn test_sort_by_priority_without_playing_is_noop() {
        let mut reg = PlayerRegistry::with_players(vec![player("a", false), player("b", false)]);
        reg.focus_next();
        reg.sort_by_priority();
        assert_eq!(reg.focus(), 1);
        assert_eq!(reg.sources()[0].name, "a");
    }

    #[test]
    fn test_describe_marks_focus() {
        let mut reg = PlayerRegistry::with_players(vec![player("a", false), player("b", true)]);
        reg.focus_next();
        assert_eq!(
            reg.describe(),
            "  0: a (Paused) a artist - a title\n* 1: b (Playing) b artist - b title\n"
        );
    }
}
