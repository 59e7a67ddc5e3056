//! Container formats and detection results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFormat {
    Json,
    Png,
    Charx,
    Voxta,
}

impl CardFormat {
    pub const ALL: [Self; 4] = [Self::Json, Self::Png, Self::Charx, Self::Voxta];

    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Png => "png",
            Self::Charx => "charx",
            Self::Voxta => "voxta",
        }
    }

    /// Extension written on export.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Png => "png",
            Self::Charx => "charx",
            Self::Voxta => "voxpkg",
        }
    }

    /// MIME type written on export.
    pub fn mimetype(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Png => "image/png",
            Self::Charx | Self::Voxta => "application/zip",
        }
    }
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CardFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "png" => Ok(Self::Png),
            "charx" => Ok(Self::Charx),
            "voxta" | "voxpkg" => Ok(Self::Voxta),
            other => Err(format!("unknown format '{other}'")),
        }
    }
}

/// How strongly a handler claims an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Unknown = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Confidence {
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Outcome of format detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub format: CardFormat,
    pub confidence: Confidence,
}

/// Optional hints accompanying raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hints<'a> {
    pub filename: Option<&'a str>,
    pub mimetype: Option<&'a str>,
}

impl<'a> Hints<'a> {
    pub fn new(filename: Option<&'a str>, mimetype: Option<&'a str>) -> Self {
        Self { filename, mimetype }
    }

    /// Lower-cased extension of the filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.filename?;
        let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
        file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.extension().is_some_and(|e| e == ext)
    }

    /// MIME type without parameters, lower-cased.
    pub fn mime(&self) -> Option<String> {
        self.mimetype
            .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Low > Confidence::Unknown);
        assert_eq!(Confidence::Medium as u8, 2);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(".CHARX".parse::<CardFormat>().unwrap(), CardFormat::Charx);
        assert_eq!("voxpkg".parse::<CardFormat>().unwrap(), CardFormat::Voxta);
        assert!("gif".parse::<CardFormat>().is_err());
    }

    #[test]
    fn test_hints() {
        let hints = Hints::new(Some("dir.v2/Card.PNG"), Some("Image/PNG; q=1"));
        assert_eq!(hints.extension().as_deref(), Some("png"));
        assert_eq!(hints.mime().as_deref(), Some("image/png"));
        assert_eq!(Hints::new(Some("noext"), None).extension(), None);
    }
}
