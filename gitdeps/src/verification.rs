//! Integrity checks for extracted file content.
//!
//! Manifests may record a SHA-1 digest per file. The [`HashPolicy`] decides
//! what a mismatch means; [`verify_hash`] performs the comparison without
//! side effects so callers decide how to report the result.

use std::fmt;

use sha1::{Digest, Sha1};

/// Policy governing how extracted content is checked against the manifest.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::verification::HashPolicy;
///
/// let policy = HashPolicy::default();
/// assert!(policy.verifies());
/// assert!(!policy.is_fatal());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    clap::ValueEnum,
    serde::Deserialize,
    serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Do not hash extracted content.
    Skip,
    /// Report mismatches and keep extracting.
    #[default]
    Warn,
    /// Treat a mismatch as a failure of the owning pack.
    Strict,
}

impl HashPolicy {
    /// Return whether content is hashed at all.
    #[must_use]
    pub fn verifies(self) -> bool {
        !matches!(self, Self::Skip)
    }

    /// Return whether a mismatch fails the pack.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl fmt::Display for HashPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "hash verification disabled"),
            Self::Warn => write!(f, "hash mismatches reported as warnings"),
            Self::Strict => write!(f, "hash mismatches fail the pack"),
        }
    }
}

/// Lowercase hexadecimal SHA-1 digest of `data`.
#[must_use]
pub fn sha1_hex(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    digest.iter().fold(String::with_capacity(40), |mut hex, byte| {
        use std::fmt::Write as _;
        // Writing to a String cannot fail.
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}

/// Compare the SHA-1 of `data` with `expected`, ignoring hex case.
///
/// Returns whether the digests match together with the computed digest.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::verification::verify_hash;
///
/// let (ok, actual) = verify_hash(b"abc", "A9993E364706816ABA3E25717850C26C9CD0D89D");
/// assert!(ok);
/// assert_eq!(actual, "a9993e364706816aba3e25717850c26c9cd0d89d");
/// ```
#[must_use]
pub fn verify_hash(data: &[u8], expected: &str) -> (bool, String) {
    let actual = sha1_hex(data);
    let matches = actual.eq_ignore_ascii_case(expected.trim());
    (matches, actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ABCDEF_SHA1: &str = "1f8ac10f23c5b5bc1167bda84b833e5c057a77d2";

    #[test]
    fn default_policy_warns() {
        assert_eq!(HashPolicy::default(), HashPolicy::Warn);
    }

    #[rstest]
    #[case::skip(HashPolicy::Skip, false, false)]
    #[case::warn(HashPolicy::Warn, true, false)]
    #[case::strict(HashPolicy::Strict, true, true)]
    fn policy_flags(#[case] policy: HashPolicy, #[case] verifies: bool, #[case] fatal: bool) {
        assert_eq!(policy.verifies(), verifies);
        assert_eq!(policy.is_fatal(), fatal);
    }

    #[test]
    fn policy_display() {
        assert_eq!(
            HashPolicy::Strict.to_string(),
            "hash mismatches fail the pack"
        );
    }

    #[test]
    fn policy_deserialises_lowercase() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            verify: HashPolicy,
        }
        let parsed: Wrapper = toml::from_str("verify = \"strict\"").expect("valid TOML");
        assert_eq!(parsed.verify, HashPolicy::Strict);
    }

    #[test]
    fn digest_of_known_input() {
        assert_eq!(sha1_hex(b"abcdef"), ABCDEF_SHA1);
    }

    #[test]
    fn verification_is_idempotent() {
        let first = verify_hash(b"abcdef", ABCDEF_SHA1);
        let second = verify_hash(b"abcdef", ABCDEF_SHA1);
        assert_eq!(first, second);
        assert!(first.0);
    }

    #[test]
    fn mismatch_reports_actual_digest() {
        let (ok, actual) = verify_hash(b"abcdeg", ABCDEF_SHA1);
        assert!(!ok);
        assert_ne!(actual, ABCDEF_SHA1);
        assert_eq!(actual.len(), 40);
    }

    #[test]
    fn comparison_ignores_case() {
        let (ok, _) = verify_hash(b"abcdef", &ABCDEF_SHA1.to_uppercase());
        assert!(ok);
    }
}
