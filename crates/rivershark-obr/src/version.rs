//! OSGi versions (`major.minor.micro.qualifier`) and version ranges.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("version is empty")]
    Empty,
    #[error("invalid numeric component {component:?}")]
    InvalidComponent { component: String },
    #[error("invalid qualifier {qualifier:?}")]
    InvalidQualifier { qualifier: String },
    #[error("invalid version range {range:?}")]
    InvalidRange { range: String },
}

/// A bundle version.
///
/// Missing components default to zero, so `1.2` and `1.2.0` are the same
/// version and both print as `1.2.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BundleVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl BundleVersion {
    pub const ZERO: BundleVersion = BundleVersion {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: String::new(),
    };

    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut parts = text.splitn(4, '.');
        let major = parse_component(parts.next())?;
        let minor = parts.next().map(|p| parse_component(Some(p))).transpose()?;
        let micro = parts.next().map(|p| parse_component(Some(p))).transpose()?;
        let qualifier = parts.next().unwrap_or_default();

        if !qualifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
            || (micro.is_some() && text.ends_with('.'))
        {
            return Err(VersionError::InvalidQualifier {
                qualifier: qualifier.to_owned(),
            });
        }

        Ok(Self {
            major,
            minor: minor.unwrap_or(0),
            micro: micro.unwrap_or(0),
            qualifier: qualifier.to_owned(),
        })
    }
}

fn parse_component(part: Option<&str>) -> Result<u32, VersionError> {
    let part = part.unwrap_or_default();
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidComponent {
            component: part.to_owned(),
        });
    }
    part.parse().map_err(|_| VersionError::InvalidComponent {
        component: part.to_owned(),
    })
}

impl FromStr for BundleVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl Ord for BundleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for BundleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A version range as written in `Import-Package` / `Require-Bundle`
/// `version` attributes.
///
/// A bare version (`1.0`) means "at least 1.0".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub floor: BundleVersion,
    pub floor_inclusive: bool,
    pub ceiling: Option<(BundleVersion, bool)>,
}

impl VersionRange {
    pub fn at_least(floor: BundleVersion) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        let invalid = || VersionError::InvalidRange {
            range: text.to_owned(),
        };

        let Some(open) = text.chars().next() else {
            return Err(VersionError::Empty);
        };
        if open != '[' && open != '(' {
            return Ok(Self::at_least(BundleVersion::parse(text)?));
        }

        let close = text.chars().last().ok_or_else(invalid)?;
        if text.len() < 2 || (close != ']' && close != ')') {
            return Err(invalid());
        }
        let inner = &text[1..text.len() - 1];
        let (floor, ceiling) = inner.split_once(',').ok_or_else(invalid)?;

        Ok(Self {
            floor: BundleVersion::parse(floor)?,
            floor_inclusive: open == '[',
            ceiling: Some((BundleVersion::parse(ceiling)?, close == ']')),
        })
    }

    /// Render as an LDAP filter over `attribute`, the way OSGi repository
    /// requirements express version constraints.
    pub fn to_filter(&self, attribute: &str) -> String {
        let floor = if self.floor_inclusive {
            format!("({attribute}>={})", self.floor)
        } else {
            format!("(!({attribute}<={}))", self.floor)
        };

        match &self.ceiling {
            None => floor,
            Some((ceiling, true)) => format!("{floor}({attribute}<={ceiling})"),
            Some((ceiling, false)) => format!("{floor}(!({attribute}>={ceiling}))"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_versions() {
        assert_eq!(BundleVersion::parse("1").unwrap(), BundleVersion::new(1, 0, 0));
        assert_eq!(BundleVersion::parse("1.2").unwrap().to_string(), "1.2.0");
        assert_eq!(
            BundleVersion::parse(" 4.0.0.SNAPSHOT-2 ").unwrap(),
            BundleVersion::new(4, 0, 0).with_qualifier("SNAPSHOT-2")
        );
        assert_eq!(
            BundleVersion::parse("1.0.0.v20240101_rc1").unwrap().to_string(),
            "1.0.0.v20240101_rc1"
        );
    }

    #[test]
    fn rejects_malformed_versions() {
        for text in ["", "a", "1.x", "1..2", "-1", "1.0.0.", "1.0.0.bad!", "1.2.3.4.5"] {
            assert!(BundleVersion::parse(text).is_err(), "{text:?} should be rejected");
        }
    }

    #[test]
    fn orders_numerically_then_by_qualifier() {
        let v = |s: &str| BundleVersion::parse(s).unwrap();
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("1.0.0.a") > v("1.0.0"));
        assert!(v("1.0.0.b") > v("1.0.0.a"));
        assert_eq!(v("2").cmp(&v("2.0.0")), Ordering::Equal);
    }

    #[test]
    fn ranges_render_as_filters() {
        let range = VersionRange::parse("[1.0,2)").unwrap();
        assert_eq!(
            range.to_filter("version"),
            "(version>=1.0.0)(!(version>=2.0.0))"
        );

        let range = VersionRange::parse("(1.0,1.5]").unwrap();
        assert_eq!(
            range.to_filter("version"),
            "(!(version<=1.0.0))(version<=1.5.0)"
        );

        assert_eq!(
            VersionRange::parse("3.1").unwrap().to_filter("bundle-version"),
            "(bundle-version>=3.1.0)"
        );
    }

    #[test]
    fn rejects_malformed_ranges() {
        for text in ["[1.0", "[1.0]", "[1.0,x)", "[", "{1,2}"] {
            assert!(VersionRange::parse(text).is_err(), "{text:?} should be rejected");
        }
    }
}
