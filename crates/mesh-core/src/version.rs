//! Semver constraint matching shared by the resolver and the proxy config.

use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, semver::Error),
    #[error("invalid version constraint '{0}': {1}")]
    InvalidConstraint(String, semver::Error),
}

/// Parse a tool's own `version` field. Accepts bare `major.minor.patch` per
/// the wire contract; `semver::Version::parse` is strict about this shape,
/// which is exactly what we want (no `1.2` shorthand on the *advertised*
/// side, only on constraints).
pub fn parse_version(raw: &str) -> Result<Version, VersionError> {
    Version::parse(raw).map_err(|e| VersionError::InvalidVersion(raw.to_string(), e))
}

/// Parse a dependency declaration's `version` constraint. Supports `=`,
/// `>=`, `>`, `<=`, `<`, `~x.y` and comma-joined conjunctions, all of which
/// `semver::VersionReq` already implements with the semantics the spec
/// describes.
pub fn parse_constraint(raw: &str) -> Result<VersionReq, VersionError> {
    VersionReq::parse(raw).map_err(|e| VersionError::InvalidConstraint(raw.to_string(), e))
}

/// Convenience used by the resolver: does `candidate` satisfy `constraint`?
pub fn matches_constraint(candidate: &Version, constraint: &VersionReq) -> bool {
    constraint.matches(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let c = parse_constraint("=1.2.0").unwrap();
        assert!(matches_constraint(&parse_version("1.2.0").unwrap(), &c));
        assert!(!matches_constraint(&parse_version("1.2.1").unwrap(), &c));
    }

    #[test]
    fn gte_match() {
        let c = parse_constraint(">=1.2.0").unwrap();
        assert!(matches_constraint(&parse_version("1.2.0").unwrap(), &c));
        assert!(matches_constraint(&parse_version("1.3.0").unwrap(), &c));
        assert!(!matches_constraint(&parse_version("1.1.9").unwrap(), &c));
    }

    #[test]
    fn tilde_minor_range() {
        let c = parse_constraint("~1.2").unwrap();
        assert!(matches_constraint(&parse_version("1.2.0").unwrap(), &c));
        assert!(matches_constraint(&parse_version("1.2.9").unwrap(), &c));
        assert!(!matches_constraint(&parse_version("1.3.0").unwrap(), &c));
    }

    #[test]
    fn conjunction() {
        let c = parse_constraint(">=1.2.0, <2.0.0").unwrap();
        assert!(matches_constraint(&parse_version("1.9.0").unwrap(), &c));
        assert!(!matches_constraint(&parse_version("2.0.0").unwrap(), &c));
    }

    #[test]
    fn invalid_constraint_is_rejected() {
        assert!(parse_constraint("not-a-version").is_err());
    }
}
