use crate::state::PlaybackSource;

/// Reply sent by the primary when a share request was honoured.
pub const REPLY_SUCCESS: &str = "success";

/// Prefix of the reply sent when a share file could not be opened.
pub const REPLY_FAILED_PREFIX: &str = "Failed: ";

/// Requests and replies are tiny; anything longer than this is not ours.
pub const MAX_REQUEST_LEN: usize = 512;

/// Separator used when joining process arguments into a fingerprint.
pub const FINGERPRINT_SEPARATOR: &str = "|";

/// Sentinel for numeric frame fields that failed to parse.
pub const INVALID_MICROS: i64 = -1;

const FRAME_FIELDS: usize = 7;

/// Commands accepted on the rendezvous socket.  Each one is sent as the whole
/// payload of a short-lived connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    FocusNext,
    FocusPrevious,
    ControlNext,
    ControlPrevious,
    ControlToggle,
    List,
    Share,
    DataShare,
    PreShare,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::FocusNext,
        Command::FocusPrevious,
        Command::ControlNext,
        Command::ControlPrevious,
        Command::ControlToggle,
        Command::List,
        Command::Share,
        Command::DataShare,
        Command::PreShare,
    ];

    /// Two-character wire code.
    pub fn code(self) -> &'static str {
        match self {
            Command::FocusNext => "pn",
            Command::FocusPrevious => "pp",
            Command::ControlNext => "cn",
            Command::ControlPrevious => "cp",
            Command::ControlToggle => "ct",
            Command::List => "ls",
            Command::Share => "sh",
            Command::DataShare => "sd",
            Command::PreShare => "ps",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Name accepted by `--send`.  Share commands are internal to the
    /// negotiation and have no user-facing name.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Command::FocusNext => Some("player-next"),
            Command::FocusPrevious => Some("player-prev"),
            Command::ControlNext => Some("next"),
            Command::ControlPrevious => Some("prev"),
            Command::ControlToggle => Some("toggle"),
            Command::List => Some("list"),
            Command::Share | Command::DataShare | Command::PreShare => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == Some(name))
    }

    /// Names usable with `--send`, for help and error messages.
    pub fn user_names() -> Vec<&'static str> {
        Self::ALL.iter().filter_map(|c| c.name()).collect()
    }

    /// Whether the primary writes something back before closing.
    pub fn expects_reply(self) -> bool {
        matches!(
            self,
            Command::List | Command::Share | Command::DataShare | Command::PreShare
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name().unwrap_or(self.code()))
    }
}

/// Deterministic join of a process's arguments (argv[0] excluded by the
/// caller).  Two instances with equal fingerprints render identically.
pub fn fingerprint<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| a.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(FINGERPRINT_SEPARATOR)
}

/// Fingerprint of the running process.
pub fn own_fingerprint() -> String {
    fingerprint(std::env::args().skip(1))
}

/// Body of a frame read back from a share file.  Every frame is written with
/// one line terminator; strip at most that one.
pub fn frame_body(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw)
}

// ── structured-data frame ─────────────────────────────────────────────────────

/// Encode a source as the 7-field structured-data frame.  `None` (no players)
/// encodes as the empty body.
pub fn encode_frame(source: Option<&PlaybackSource>) -> String {
    let Some(s) = source else {
        return String::new();
    };
    [
        s.length.to_string(),
        s.position.to_string(),
        if s.playing { "1" } else { "0" }.to_string(),
        s.artist.clone(),
        s.album.clone(),
        s.title.clone(),
        s.name.clone(),
    ]
    .join("\n")
}

/// Decode a frame body.  Numeric fields that do not parse become
/// [`INVALID_MICROS`]; missing trailing fields are empty.  The result is
/// always marked as a duplicate since it carries no control handle.
pub fn decode_frame(body: &str) -> Option<PlaybackSource> {
    if body.is_empty() {
        return None;
    }
    let mut fields = body.splitn(FRAME_FIELDS, '\n');
    let mut next = || fields.next().unwrap_or("").to_string();

    let length = parse_micros(&next());
    let position = parse_micros(&next());
    let playing = next() == "1";

    Some(PlaybackSource {
        length,
        position,
        playing,
        artist: next(),
        album: next(),
        title: next(),
        name: next(),
        duplicate: true,
    })
}

/// Whether a data frame body carries all of its fields.  The primary only
/// ever writes complete frames, so a short one is a prefix left by a
/// shrinking rewrite.
pub fn is_complete_frame(body: &str) -> bool {
    body.is_empty() || body.matches('\n').count() >= FRAME_FIELDS - 1
}

fn parse_micros(field: &str) -> i64 {
    field.trim().parse().unwrap_or(INVALID_MICROS)
}
