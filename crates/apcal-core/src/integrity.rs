//! Streaming MD5 digests for model artifacts.
//!
//! Files are read in fixed-size blocks so memory stays bounded regardless of
//! artifact size. A missing file surfaces as [`ApcalError::FileNotFound`],
//! which the loader treats as its cue to fetch the artifact.

use crate::config::IntegrityConfig;
use crate::error::{ApcalError, Result};
use md5::{Digest, Md5};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// How strictly artifact digests are compared against the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestPolicy {
    /// Any mismatch is fatal.
    #[default]
    Strict,
    /// Accept a mismatch only when the digest of the file with CRLF line
    /// endings rewritten to LF matches. Covers text artifacts checked out
    /// with Windows line endings; every other mismatch stays fatal.
    NormalizeLineEndings,
}

/// Outcome of checking a file against an optional reference digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestCheck {
    /// No reference given; the computed digest.
    Computed(String),
    /// Reference given and equal.
    Match,
    /// Reference given and different.
    Mismatch { actual: String },
}

impl DigestCheck {
    pub fn is_match(&self) -> bool {
        matches!(self, DigestCheck::Match)
    }
}

/// Compute the MD5 digest of a file as lowercase hex.
pub fn compute_md5(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| ApcalError::io_with_path(e, path))?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; IntegrityConfig::DIGEST_BLOCK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ApcalError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the MD5 digest of a file after rewriting CRLF to LF.
///
/// A CR at the end of one block is held back until the next block shows
/// whether it starts a CRLF pair.
pub fn compute_md5_lf_normalized(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| ApcalError::io_with_path(e, path))?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; IntegrityConfig::DIGEST_BLOCK_SIZE];
    let mut normalized = Vec::with_capacity(IntegrityConfig::DIGEST_BLOCK_SIZE);
    let mut pending_cr = false;

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ApcalError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }

        normalized.clear();
        for &byte in &buffer[..bytes_read] {
            if pending_cr {
                pending_cr = false;
                if byte != b'\n' {
                    normalized.push(b'\r');
                }
            }
            if byte == b'\r' {
                pending_cr = true;
            } else {
                normalized.push(byte);
            }
        }
        hasher.update(&normalized);
    }
    if pending_cr {
        hasher.update(b"\r");
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Check a file against an optional reference digest.
///
/// Without a reference the digest is computed, logged, and returned. This is
/// the operator mode used to fill in manifest entries.
pub fn check_md5(path: impl AsRef<Path>, expected: Option<&str>) -> Result<DigestCheck> {
    let path = path.as_ref();
    let actual = compute_md5(path)?;

    match expected {
        None => {
            info!("{}: {}", path.display(), actual);
            Ok(DigestCheck::Computed(actual))
        }
        Some(expected) if expected.trim().eq_ignore_ascii_case(&actual) => Ok(DigestCheck::Match),
        Some(_) => Ok(DigestCheck::Mismatch { actual }),
    }
}

/// Verify a model artifact against its manifest digest under `policy`.
///
/// Returns `Ok(())` on success, [`ApcalError::IntegrityMismatch`] naming the
/// model, file, and both digests otherwise.
pub fn verify_artifact(
    model: &str,
    path: impl AsRef<Path>,
    expected: &str,
    policy: DigestPolicy,
) -> Result<()> {
    let path = path.as_ref();
    let actual = match check_md5(path, Some(expected))? {
        DigestCheck::Match => return Ok(()),
        DigestCheck::Mismatch { actual } => actual,
        DigestCheck::Computed(actual) => actual,
    };

    if policy == DigestPolicy::NormalizeLineEndings {
        let normalized = compute_md5_lf_normalized(path)?;
        if normalized.eq_ignore_ascii_case(expected.trim()) {
            warn!(
                "Model {} ({}) matches its digest only after line-ending normalization; accepting",
                model,
                path.display()
            );
            return Ok(());
        }
    }

    Err(ApcalError::IntegrityMismatch {
        model: model.to_string(),
        path: path.to_path_buf(),
        expected: expected.trim().to_lowercase(),
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // md5("") and md5("hello\n")
    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const HELLO_LF_MD5: &str = "b1946ac92492d2347c6235b4d2611184";

    fn file_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_md5_empty_file() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(compute_md5(file.path()).unwrap(), EMPTY_MD5);
    }

    #[test]
    fn test_md5_content() {
        let file = file_with(b"hello\n");
        assert_eq!(compute_md5(file.path()).unwrap(), HELLO_LF_MD5);
    }

    #[test]
    fn test_md5_spanning_blocks() {
        let content = vec![7u8; IntegrityConfig::DIGEST_BLOCK_SIZE * 2 + 17];
        let file = file_with(&content);
        let expected = hex::encode(Md5::digest(&content));
        assert_eq!(compute_md5(file.path()).unwrap(), expected);
    }

    #[test]
    fn test_check_without_reference_returns_digest() {
        let file = file_with(b"hello\n");
        let check = check_md5(file.path(), None).unwrap();
        assert_eq!(check, DigestCheck::Computed(HELLO_LF_MD5.to_string()));
    }

    #[test]
    fn test_check_with_reference() {
        let file = file_with(b"hello\n");
        assert!(check_md5(file.path(), Some(HELLO_LF_MD5)).unwrap().is_match());
        assert!(check_md5(file.path(), Some(&HELLO_LF_MD5.to_uppercase()))
            .unwrap()
            .is_match());
        assert_eq!(
            check_md5(file.path(), Some(EMPTY_MD5)).unwrap(),
            DigestCheck::Mismatch {
                actual: HELLO_LF_MD5.to_string()
            }
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = check_md5("/nonexistent/artifact.json", Some(EMPTY_MD5)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_lf_normalized_digest() {
        let file = file_with(b"hello\r\n");
        assert_eq!(compute_md5_lf_normalized(file.path()).unwrap(), HELLO_LF_MD5);

        // Lone CRs are kept.
        let file = file_with(b"a\rb");
        assert_eq!(
            compute_md5_lf_normalized(file.path()).unwrap(),
            compute_md5(file.path()).unwrap()
        );
    }

    #[test]
    fn test_lf_normalized_digest_across_block_boundary() {
        let mut content = vec![b'x'; IntegrityConfig::DIGEST_BLOCK_SIZE - 1];
        content.extend_from_slice(b"\r\nend\r");
        let file = file_with(&content);

        let mut expected = vec![b'x'; IntegrityConfig::DIGEST_BLOCK_SIZE - 1];
        expected.extend_from_slice(b"\nend\r");
        assert_eq!(
            compute_md5_lf_normalized(file.path()).unwrap(),
            hex::encode(Md5::digest(&expected))
        );
    }

    #[test]
    fn test_verify_artifact_strict_rejects_crlf_copy() {
        let file = file_with(b"hello\r\n");
        let err = verify_artifact("mh", file.path(), HELLO_LF_MD5, DigestPolicy::Strict)
            .unwrap_err();
        match err {
            ApcalError::IntegrityMismatch {
                model,
                expected,
                actual,
                ..
            } => {
                assert_eq!(model, "mh");
                assert_eq!(expected, HELLO_LF_MD5);
                assert_ne!(actual, HELLO_LF_MD5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_verify_artifact_normalized_policy_is_narrow() {
        let file = file_with(b"hello\r\n");
        assert!(verify_artifact(
            "mh",
            file.path(),
            HELLO_LF_MD5,
            DigestPolicy::NormalizeLineEndings
        )
        .is_ok());

        // A genuinely different file still fails under the relaxed policy.
        let file = file_with(b"goodbye\r\n");
        assert!(verify_artifact(
            "mh",
            file.path(),
            HELLO_LF_MD5,
            DigestPolicy::NormalizeLineEndings
        )
        .is_err());
    }
}
