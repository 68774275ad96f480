//! Client → device commands.
//!
//! Uses proper enums with `FromStr`: unknown IR codes are carried in
//! [`IrCode::Other`] rather than rejected, since devices accept more
//! codes than any table lists.

use std::fmt;
use std::str::FromStr;

use crate::error::TivoError;

// ── Screen ───────────────────────────────────────────────────────

/// Logical UI context of a device, the target of `TELEPORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Screen {
    #[default]
    LiveTv,
    Tivo,
    NowPlaying,
    Guide,
}

impl Screen {
    /// Every screen, in menu order.
    pub const ALL: [Screen; 4] = [Screen::LiveTv, Screen::Tivo, Screen::NowPlaying, Screen::Guide];

    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::LiveTv => "LIVETV",
            Screen::Tivo => "TIVO",
            Screen::NowPlaying => "NOWPLAYING",
            Screen::Guide => "GUIDE",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Screen {
    type Err = TivoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Screen::ALL
            .into_iter()
            .find(|screen| screen.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TivoError::InvalidCommand(format!("unknown screen {s:?}")))
    }
}

// ── IrCode ───────────────────────────────────────────────────────

/// A remote-control button, sent as `IRCODE <code>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrCode {
    Up,
    Down,
    Left,
    Right,
    Select,
    Tivo,
    LiveTv,
    NowPlaying,
    Guide,
    Info,
    Exit,
    ThumbsUp,
    ThumbsDown,
    ChannelUp,
    ChannelDown,
    Mute,
    VolumeUp,
    VolumeDown,
    TvInput,
    CcOn,
    CcOff,
    ActionA,
    ActionB,
    ActionC,
    ActionD,
    Enter,
    Clear,
    Play,
    Pause,
    Slow,
    Forward,
    Reverse,
    Standby,
    Replay,
    Advance,
    Record,
    /// `NUM0` .. `NUM9`.
    Num(u8),
    /// Any code not modelled above, sent verbatim.
    Other(String),
}

impl IrCode {
    /// Wire spelling for codes with a fixed name.
    fn fixed_name(&self) -> Option<&'static str> {
        let name = match self {
            IrCode::Up => "UP",
            IrCode::Down => "DOWN",
            IrCode::Left => "LEFT",
            IrCode::Right => "RIGHT",
            IrCode::Select => "SELECT",
            IrCode::Tivo => "TIVO",
            IrCode::LiveTv => "LIVETV",
            IrCode::NowPlaying => "NOWPLAYING",
            IrCode::Guide => "GUIDE",
            IrCode::Info => "INFO",
            IrCode::Exit => "EXIT",
            IrCode::ThumbsUp => "THUMBSUP",
            IrCode::ThumbsDown => "THUMBSDOWN",
            IrCode::ChannelUp => "CHANNELUP",
            IrCode::ChannelDown => "CHANNELDOWN",
            IrCode::Mute => "MUTE",
            IrCode::VolumeUp => "VOLUMEUP",
            IrCode::VolumeDown => "VOLUMEDOWN",
            IrCode::TvInput => "TVINPUT",
            IrCode::CcOn => "CC_ON",
            IrCode::CcOff => "CC_OFF",
            IrCode::ActionA => "ACTION_A",
            IrCode::ActionB => "ACTION_B",
            IrCode::ActionC => "ACTION_C",
            IrCode::ActionD => "ACTION_D",
            IrCode::Enter => "ENTER",
            IrCode::Clear => "CLEAR",
            IrCode::Play => "PLAY",
            IrCode::Pause => "PAUSE",
            IrCode::Slow => "SLOW",
            IrCode::Forward => "FORWARD",
            IrCode::Reverse => "REVERSE",
            IrCode::Standby => "STANDBY",
            IrCode::Replay => "REPLAY",
            IrCode::Advance => "ADVANCE",
            IrCode::Record => "RECORD",
            IrCode::Num(_) | IrCode::Other(_) => return None,
        };
        Some(name)
    }

    const FIXED: [IrCode; 36] = [
        IrCode::Up,
        IrCode::Down,
        IrCode::Left,
        IrCode::Right,
        IrCode::Select,
        IrCode::Tivo,
        IrCode::LiveTv,
        IrCode::NowPlaying,
        IrCode::Guide,
        IrCode::Info,
        IrCode::Exit,
        IrCode::ThumbsUp,
        IrCode::ThumbsDown,
        IrCode::ChannelUp,
        IrCode::ChannelDown,
        IrCode::Mute,
        IrCode::VolumeUp,
        IrCode::VolumeDown,
        IrCode::TvInput,
        IrCode::CcOn,
        IrCode::CcOff,
        IrCode::ActionA,
        IrCode::ActionB,
        IrCode::ActionC,
        IrCode::ActionD,
        IrCode::Enter,
        IrCode::Clear,
        IrCode::Play,
        IrCode::Pause,
        IrCode::Slow,
        IrCode::Forward,
        IrCode::Reverse,
        IrCode::Standby,
        IrCode::Replay,
        IrCode::Advance,
        IrCode::Record,
    ];
}

impl fmt::Display for IrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrCode::Num(n) => write!(f, "NUM{n}"),
            IrCode::Other(code) => f.write_str(code),
            fixed => f.write_str(fixed.fixed_name().unwrap_or_default()),
        }
    }
}

impl FromStr for IrCode {
    type Err = TivoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(TivoError::InvalidCommand(format!("bad IR code {s:?}")));
        }
        let upper = s.to_ascii_uppercase();

        if let Some(digit) = upper.strip_prefix("NUM") {
            if let Ok(n @ 0..=9) = digit.parse::<u8>() {
                return Ok(IrCode::Num(n));
            }
        }

        Ok(IrCode::FIXED
            .into_iter()
            .find(|code| code.fixed_name() == Some(upper.as_str()))
            .unwrap_or(IrCode::Other(upper)))
    }
}

// ── Command ──────────────────────────────────────────────────────

/// A single control-channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `KEYBOARD <text>`: fire-and-forget keystroke.
    Keyboard(String),
    /// `IRCODE <code>`: remote-control button press.
    IrCode(IrCode),
    /// `SETCH <channel>`: tune directly to a channel.
    SetChannel(String),
    /// `TELEPORT <screen>`: jump to a screen.
    Teleport(Screen),
}

impl Command {
    /// Whether the device answers this command with a status line.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::Keyboard(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Keyboard(text) => write!(f, "KEYBOARD {text}"),
            Command::IrCode(code) => write!(f, "IRCODE {code}"),
            Command::SetChannel(channel) => write!(f, "SETCH {channel}"),
            Command::Teleport(screen) => write!(f, "TELEPORT {screen}"),
        }
    }
}

impl FromStr for Command {
    type Err = TivoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (verb, arg) = line
            .split_once(' ')
            .ok_or_else(|| TivoError::InvalidCommand(line.to_string()))?;
        let arg = arg.trim();

        match verb {
            "KEYBOARD" => Ok(Command::Keyboard(arg.to_string())),
            "IRCODE" => Ok(Command::IrCode(arg.parse()?)),
            "SETCH" => Ok(Command::SetChannel(arg.to_string())),
            "TELEPORT" => Ok(Command::Teleport(arg.parse()?)),
            _ => Err(TivoError::InvalidCommand(line.to_string())),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_text() {
        assert_eq!(Command::IrCode(IrCode::ChannelUp).to_string(), "IRCODE CHANNELUP");
        assert_eq!(Command::SetChannel("702".into()).to_string(), "SETCH 702");
        assert_eq!(Command::Teleport(Screen::NowPlaying).to_string(), "TELEPORT NOWPLAYING");
        assert_eq!(Command::Keyboard("A".into()).to_string(), "KEYBOARD A");
    }

    #[test]
    fn keyboard_is_fire_and_forget() {
        assert!(!Command::Keyboard("A".into()).expects_response());
        assert!(Command::IrCode(IrCode::Exit).expects_response());
    }

    #[test]
    fn ir_code_parsing() {
        assert_eq!("channelup".parse::<IrCode>().unwrap(), IrCode::ChannelUp);
        assert_eq!("NUM7".parse::<IrCode>().unwrap(), IrCode::Num(7));
        assert_eq!("CC_ON".parse::<IrCode>().unwrap(), IrCode::CcOn);
        assert_eq!(
            "VIDEO_MODE_FIXED_1080i".parse::<IrCode>().unwrap(),
            IrCode::Other("VIDEO_MODE_FIXED_1080I".into())
        );
        assert!("".parse::<IrCode>().is_err());
        assert!("TWO WORDS".parse::<IrCode>().is_err());
    }

    #[test]
    fn ir_code_names_are_unique() {
        for code in IrCode::FIXED {
            assert_eq!(code.to_string().parse::<IrCode>().unwrap(), code);
        }
    }

    #[test]
    fn screen_parsing() {
        assert_eq!("GUIDE".parse::<Screen>().unwrap(), Screen::Guide);
        assert_eq!("livetv".parse::<Screen>().unwrap(), Screen::LiveTv);
        assert!("MENU".parse::<Screen>().is_err());
        assert_eq!(Screen::default(), Screen::LiveTv);
    }

    #[test]
    fn command_parsing() {
        assert_eq!(
            "IRCODE CHANNELDOWN\r".parse::<Command>().unwrap(),
            Command::IrCode(IrCode::ChannelDown)
        );
        assert_eq!(
            "TELEPORT TIVO".parse::<Command>().unwrap(),
            Command::Teleport(Screen::Tivo)
        );
        assert!("HELLO".parse::<Command>().is_err());
        assert!("FOO BAR".parse::<Command>().is_err());
    }
}
