use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config_err;
use crate::error::Result;

/// A position within a stream.
///
/// `Unbounded`, `Head` and `Tail` are symbolic markers that only make sense in configuration;
/// the admin service turns `Head` and `Tail` into `Position` tokens. `Position` tokens are
/// opaque to this crate and are handed to the engine's reader untouched.
///
/// The text form is shared by markers and tokens, so a token may not be empty, carry
/// surrounding whitespace, or spell a marker. Build tokens with [`StreamCut::position`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum StreamCut {
    #[default]
    Unbounded,
    Head,
    Tail,
    Position(String),
}

impl StreamCut {
    pub const UNBOUNDED_TEXT: &'static str = "UNBOUNDED";

    pub fn position(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if !is_valid_token(&token) {
            return Err(config_err!("Invalid stream cut token {:?}: it would read back as a different cut", token));
        }
        Ok(StreamCut::Position(token))
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, StreamCut::Unbounded)
    }

    pub fn as_text(&self) -> &str {
        match self {
            StreamCut::Unbounded => Self::UNBOUNDED_TEXT,
            StreamCut::Head => "head",
            StreamCut::Tail => "tail",
            StreamCut::Position(token) => token,
        }
    }
}

fn parse_marker(text: &str) -> Option<StreamCut> {
    if text.is_empty() || text.eq_ignore_ascii_case(StreamCut::UNBOUNDED_TEXT) {
        Some(StreamCut::Unbounded)
    } else if text.eq_ignore_ascii_case("head") {
        Some(StreamCut::Head)
    } else if text.eq_ignore_ascii_case("tail") {
        Some(StreamCut::Tail)
    } else {
        None
    }
}

fn is_valid_token(token: &str) -> bool {
    token.trim() == token && parse_marker(token).is_none()
}

impl fmt::Display for StreamCut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

/// Lenient parse for configuration values: input is trimmed and markers are matched without
/// regard to case. Everything else is a token.
impl FromStr for StreamCut {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(parse_marker(trimmed).unwrap_or_else(|| StreamCut::Position(trimmed.to_string())))
    }
}

impl From<&str> for StreamCut {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(cut) => cut,
            Err(never) => match never {},
        }
    }
}

impl Serialize for StreamCut {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let StreamCut::Position(token) = self {
            if !is_valid_token(token) {
                return Err(serde::ser::Error::custom(format!("stream cut token {:?} collides with a marker", token)));
            }
        }
        serializer.serialize_str(self.as_text())
    }
}

impl<'de> Deserialize<'de> for StreamCut {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(StreamCut::from(text.as_str()))
    }
}

/// Cut over a freshly created stream: every initial segment at offset zero.
pub(crate) fn initial_stream_cut(segments: u32) -> StreamCut {
    let positions = (0..segments.max(1))
        .map(|segment| format!("{}:0", segment))
        .collect::<Vec<_>>();
    StreamCut::Position(positions.join(","))
}

/// The resolved start and end positions for a stream reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderBounds {
    pub start: StreamCut,
    pub end: StreamCut,
}

impl ReaderBounds {
    /// A reader with no end position keeps reading as new events arrive.
    pub fn is_bounded(&self) -> bool {
        !self.end.is_unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markers() -> Result<()> {
        assert_eq!(StreamCut::from("UNBOUNDED"), StreamCut::Unbounded);
        assert_eq!(StreamCut::from("unbounded"), StreamCut::Unbounded);
        assert_eq!(StreamCut::from(""), StreamCut::Unbounded);
        assert_eq!(StreamCut::from("HEAD"), StreamCut::Head);
        assert_eq!(StreamCut::from(" tail "), StreamCut::Tail);
        assert_eq!(StreamCut::from("0:120,1:64"), StreamCut::position("0:120,1:64")?);
        assert_eq!(StreamCut::from(" 0:1 "), StreamCut::position("0:1")?);
        Ok(())
    }

    #[test]
    fn test_tokens_cannot_spell_markers() {
        for token in ["tail", "Head", "unbounded", "", " 0:1 ", "0:1\n"] {
            assert!(StreamCut::position(token).is_err(), "{:?} accepted", token);
        }
        assert!(serde_json::to_string(&StreamCut::Position("tail".to_string())).is_err());
        assert!(serde_json::to_string(&StreamCut::Position(String::new())).is_err());
    }

    #[test]
    fn test_json_form_reads_back_unchanged() -> Result<()> {
        let cuts = vec![
            StreamCut::Unbounded,
            StreamCut::Head,
            StreamCut::Tail,
            StreamCut::position("tails")?,
            StreamCut::position("0:0, 1:7")?,
            initial_stream_cut(2),
        ];
        let json = serde_json::to_string(&cuts)?;
        assert_eq!(serde_json::from_str::<Vec<StreamCut>>(&json)?, cuts);
        Ok(())
    }

    #[test]
    fn test_initial_stream_cut() -> Result<()> {
        assert_eq!(initial_stream_cut(3), StreamCut::position("0:0,1:0,2:0")?);
        assert_eq!(initial_stream_cut(0), StreamCut::position("0:0")?);
        Ok(())
    }

    #[test]
    fn test_json_form_is_plain_text() -> Result<()> {
        let bounds = ReaderBounds {
            start: StreamCut::position("H0")?,
            end: StreamCut::Unbounded,
        };
        let json = serde_json::to_string(&bounds)?;
        assert_eq!(json, r#"{"start":"H0","end":"UNBOUNDED"}"#);
        assert!(!bounds.is_bounded());
        Ok(())
    }
}
