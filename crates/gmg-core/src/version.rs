//! Go-flavored semantic version handling.
//!
//! Go module versions carry a leading `v` (`v1.2.3`, `v1.2.3-pre`,
//! `v1.2.3+meta`). Precedence follows semver: build metadata is ignored when
//! comparing, and an invalid version sorts below every valid one.

use std::cmp::Ordering;

/// Parse a Go module version. Requires the leading `v` and a full
/// `MAJOR.MINOR.PATCH` triple.
pub fn parse(v: &str) -> Option<semver::Version> {
    let rest = v.strip_prefix('v')?;
    semver::Version::parse(rest).ok()
}

/// Whether the version is valid and in canonical form (what [`parse`]
/// accepts, spelled exactly as its canonical rendering).
pub fn is_canonical(v: &str) -> bool {
    match parse(v) {
        Some(parsed) => format!("v{parsed}") == v,
        None => false,
    }
}

/// Compare two versions by semver precedence. An invalid version compares
/// less than a valid one; two invalid versions compare equal.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(av), Some(bv)) => av.cmp_precedence(&bv),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requires_v_prefix() {
        assert!(parse("v1.2.3").is_some());
        assert!(parse("1.2.3").is_none());
        assert!(parse("").is_none());
        assert!(parse("latest").is_none());
    }

    #[test]
    fn test_canonical() {
        assert!(is_canonical("v1.2.3"));
        assert!(is_canonical("v0.0.0"));
        assert!(is_canonical("v1.2.3-rc.1"));
        assert!(is_canonical("v1.2.3+incompatible"));
        // Incomplete or decorated forms are not canonical.
        assert!(!is_canonical("v1.2"));
        assert!(!is_canonical("v01.2.3"));
        assert!(!is_canonical("1.2.3"));
        assert!(!is_canonical("latest"));
        assert!(!is_canonical(""));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare("v1.0.0", "v1.0.0"), Ordering::Equal);
        assert_eq!(compare("v1.0.0", "v1.1.0"), Ordering::Less);
        assert_eq!(compare("v2.0.0", "v1.9.9"), Ordering::Greater);
        // Prerelease sorts below the release.
        assert_eq!(compare("v1.0.0-rc.1", "v1.0.0"), Ordering::Less);
        // Build metadata is ignored for precedence.
        assert_eq!(compare("v1.0.0+a", "v1.0.0+b"), Ordering::Equal);
        // Invalid versions sort first.
        assert_eq!(compare("", "v0.0.1"), Ordering::Less);
        assert_eq!(compare("bogus", ""), Ordering::Equal);
    }
}
