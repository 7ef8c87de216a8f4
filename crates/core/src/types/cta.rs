//! Call-to-action type of the form variant a lead came through.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Priority;

/// The originating form variant.
///
/// The marketing site posts the short codes `demo` and `waitlist`; older
/// forms and manual entries use the button captions instead. Both spellings
/// parse to the same variant. Anything else is kept verbatim as [`Other`].
///
/// [`Other`]: CtaType::Other
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum CtaType {
    /// "Request a Clinical Demo".
    #[default]
    Demo,
    /// "Join the Waiting List".
    Waitlist,
    /// Any other form variant.
    Other(String),
}

impl CtaType {
    /// Button caption of the demo form.
    pub const DEMO_CAPTION: &'static str = "Request a Clinical Demo";
    /// Button caption of the waitlist form.
    pub const WAITLIST_CAPTION: &'static str = "Join the Waiting List";

    /// Parse a submitted CTA value. Never fails.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "demo" | Self::DEMO_CAPTION => Self::Demo,
            "waitlist" | Self::WAITLIST_CAPTION => Self::Waitlist,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Short code recorded in a prospect's submission history.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Demo => "demo",
            Self::Waitlist => "waitlist",
            Self::Other(s) => s,
        }
    }

    /// `leadSource` recorded on a prospect created from this CTA.
    #[must_use]
    pub const fn lead_source(&self) -> &'static str {
        match self {
            Self::Waitlist => "Waitlist",
            Self::Demo | Self::Other(_) => "Demo Request",
        }
    }

    /// Initial priority of a prospect created from this CTA.
    #[must_use]
    pub const fn initial_priority(&self) -> Priority {
        match self {
            Self::Demo => Priority::High,
            Self::Waitlist | Self::Other(_) => Priority::Medium,
        }
    }

    /// Whether this is the demo-request variant.
    #[must_use]
    pub const fn is_demo(&self) -> bool {
        matches!(self, Self::Demo)
    }
}

impl fmt::Display for CtaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CtaType {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for CtaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CtaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_codes_and_captions() {
        assert_eq!(CtaType::parse("demo"), CtaType::Demo);
        assert_eq!(CtaType::parse("Request a Clinical Demo"), CtaType::Demo);
        assert_eq!(CtaType::parse("waitlist"), CtaType::Waitlist);
        assert_eq!(CtaType::parse("Join the Waiting List"), CtaType::Waitlist);
        assert_eq!(
            CtaType::parse("newsletter"),
            CtaType::Other("newsletter".to_owned())
        );
    }

    #[test]
    fn test_lead_source() {
        assert_eq!(CtaType::Waitlist.lead_source(), "Waitlist");
        assert_eq!(CtaType::Demo.lead_source(), "Demo Request");
        assert_eq!(CtaType::parse("other").lead_source(), "Demo Request");
    }

    #[test]
    fn test_initial_priority() {
        assert_eq!(CtaType::Demo.initial_priority(), Priority::High);
        assert_eq!(CtaType::Waitlist.initial_priority(), Priority::Medium);
        assert_eq!(CtaType::parse("x").initial_priority(), Priority::Medium);
    }

    #[test]
    fn test_serde_short_code() {
        let cta: CtaType = serde_json::from_str("\"Join the Waiting List\"").unwrap();
        assert_eq!(serde_json::to_string(&cta).unwrap(), "\"waitlist\"");
    }
}
