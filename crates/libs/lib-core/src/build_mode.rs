//! Build mode selection for a compile run.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The three supported build flavors.
///
/// `Quick` trades optimization for turnaround and is the default. `Debug`
/// keeps intermediates so the browser debugger can step into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Quick,
    Debug,
    Release,
}

impl BuildMode {
    /// Upper-case name used in log banners and the rebuild event stream.
    pub fn name(&self) -> &'static str {
        match self {
            BuildMode::Quick => "QUICK",
            BuildMode::Debug => "DEBUG",
            BuildMode::Release => "RELEASE",
        }
    }

    /// Lower-case name used in request headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Quick => "quick",
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
        }
    }

    /// Parse an optional header value, defaulting to `Quick` when absent.
    pub fn from_header(value: Option<&str>) -> Result<Self, Error> {
        match value {
            None => Ok(BuildMode::Quick),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for BuildMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(BuildMode::Quick),
            "debug" => Ok(BuildMode::Debug),
            "release" => Ok(BuildMode::Release),
            _ => Err(Error::BadBuildMode),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("quick".parse::<BuildMode>().unwrap(), BuildMode::Quick);
        assert_eq!("QUICK".parse::<BuildMode>().unwrap(), BuildMode::Quick);
        assert_eq!("Release".parse::<BuildMode>().unwrap(), BuildMode::Release);
        assert_eq!("debug".parse::<BuildMode>().unwrap(), BuildMode::Debug);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("frobnicate".parse::<BuildMode>().is_err());
        assert!("".parse::<BuildMode>().is_err());
    }

    #[test]
    fn test_absent_header_defaults_to_quick() {
        assert_eq!(BuildMode::from_header(None).unwrap(), BuildMode::Quick);
        assert_eq!(
            BuildMode::from_header(Some("release")).unwrap(),
            BuildMode::Release
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(BuildMode::Quick.name(), "QUICK");
        assert_eq!(BuildMode::Debug.as_str(), "debug");
    }
}
