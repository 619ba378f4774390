// 📄 Document Access - Turn statement bytes into per-page layout text
//
// Access failures (wrong or missing password) are kept distinct from every
// other failure so callers can ask for another credential. Page failures are
// returned per page and never abort the document.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Pages in extracted layout text are separated by form feeds
const PAGE_SEPARATOR: u8 = 0x0c;

pub const DEFAULT_MAX_PASSWORD_ATTEMPTS: u32 = 3;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The supplied credential was missing or wrong
    Denied { reason: String },

    /// Every allowed attempt was rejected
    AttemptsExhausted { attempts: u32 },

    /// The credential provider stopped supplying passwords
    NoCredential { attempts: u32 },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::Denied { reason } => write!(f, "document access denied: {reason}"),
            AccessError::AttemptsExhausted { attempts } => {
                write!(f, "document rejected after {attempts} password attempts")
            }
            AccessError::NoCredential { attempts } => {
                write!(f, "no password supplied after {attempts} failed attempts")
            }
        }
    }
}

impl std::error::Error for AccessError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageError {
    /// Zero-based page index within the document
    pub page: usize,
    pub reason: String,
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} unreadable: {}", self.page + 1, self.reason)
    }
}

impl std::error::Error for PageError {}

pub type PageResult = std::result::Result<String, PageError>;

// ============================================================================
// READERS
// ============================================================================

pub trait DocumentReader {
    /// Extract every page's layout-preserving text.
    /// A wrong password must surface as `AccessError::Denied` inside the error.
    fn extract_pages(&self, bytes: &[u8], password: Option<&str>) -> Result<Vec<PageResult>>;
}

/// Split form-feed separated text into pages, decoding each independently
pub fn split_pages(bytes: &[u8]) -> Vec<PageResult> {
    let mut chunks: Vec<&[u8]> = bytes.split(|b| *b == PAGE_SEPARATOR).collect();

    // Extractors terminate the last page with a form feed too
    if chunks.len() > 1 && chunks.last().is_some_and(|c| c.iter().all(u8::is_ascii_whitespace)) {
        chunks.pop();
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(page, chunk)| {
            String::from_utf8(chunk.to_vec()).map_err(|e| PageError {
                page,
                reason: format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
            })
        })
        .collect()
}

/// Already-extracted layout text (e.g. saved `pdftotext -layout` output)
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDocumentReader;

impl DocumentReader for TextDocumentReader {
    fn extract_pages(&self, bytes: &[u8], _password: Option<&str>) -> Result<Vec<PageResult>> {
        Ok(split_pages(bytes))
    }
}

/// Shells out to poppler's `pdftotext -layout`.
///
/// The document is staged in an owner-only temp file that is removed when
/// extraction ends. pdftotext only accepts the password as `-upw`, so it is
/// visible in the process list (`/proc/<pid>/cmdline`) to other local users
/// while the extractor runs.
#[derive(Debug, Clone)]
pub struct PdftotextReader {
    command: PathBuf,
}

impl PdftotextReader {
    /// Resolve the extractor binary on PATH (or accept an explicit path)
    pub fn locate(command: &str) -> Result<Self> {
        let command = which::which(command)
            .with_context(|| format!("PDF extractor '{}' not found on PATH", command))?;
        debug!(extractor = %command.display(), "located PDF extractor");
        Ok(PdftotextReader { command })
    }

    fn run(&self, input: &Path, password: Option<&str>) -> Result<Vec<PageResult>> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-layout").arg("-enc").arg("UTF-8");
        if let Some(pw) = password.filter(|pw| !pw.is_empty()) {
            cmd.arg("-upw").arg(pw);
        }
        cmd.arg(input).arg("-");

        let output = cmd
            .output()
            .with_context(|| format!("Failed to run {}", self.command.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let lowered = stderr.to_lowercase();
            if lowered.contains("password") || lowered.contains("encrypted") {
                return Err(AccessError::Denied { reason: stderr }.into());
            }
            bail!("PDF extraction failed ({}): {}", output.status, stderr);
        }

        let pages = split_pages(&output.stdout);
        info!(pages = pages.len(), bytes = output.stdout.len(), "extracted statement text");
        Ok(pages)
    }
}

impl DocumentReader for PdftotextReader {
    fn extract_pages(&self, bytes: &[u8], password: Option<&str>) -> Result<Vec<PageResult>> {
        // Created 0600 and deleted on drop, including on early return
        let mut staged = tempfile::Builder::new()
            .prefix("expense-ledger-")
            .suffix(".pdf")
            .tempfile()
            .context("Failed to create staging file for document")?;
        staged
            .write_all(bytes)
            .and_then(|_| staged.flush())
            .with_context(|| format!("Failed to stage document at {}", staged.path().display()))?;

        self.run(staged.path(), password)
    }
}

// ============================================================================
// RETRY-LIMITED ACCESS
// ============================================================================

/// Try credentials from `credentials(attempt)` (1-based) until one opens the
/// document or `max_attempts` passwords have been rejected.
pub fn open_with_retry<R, F>(
    reader: &R,
    bytes: &[u8],
    max_attempts: u32,
    mut credentials: F,
) -> Result<Vec<PageResult>>
where
    R: DocumentReader + ?Sized,
    F: FnMut(u32) -> Option<String>,
{
    for attempt in 1..=max_attempts {
        let Some(password) = credentials(attempt) else {
            return Err(AccessError::NoCredential { attempts: attempt - 1 }.into());
        };

        match reader.extract_pages(bytes, Some(&password)) {
            Ok(pages) => return Ok(pages),
            Err(e) => match e.downcast_ref::<AccessError>() {
                Some(AccessError::Denied { reason }) => {
                    warn!(attempt, max_attempts, reason = %reason, "password rejected");
                }
                _ => return Err(e),
            },
        }
    }

    Err(AccessError::AttemptsExhausted { attempts: max_attempts }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Accepts exactly one password and counts how often it was asked
    struct LockedReader {
        password: &'static str,
        calls: Cell<u32>,
    }

    impl DocumentReader for LockedReader {
        fn extract_pages(&self, bytes: &[u8], password: Option<&str>) -> Result<Vec<PageResult>> {
            self.calls.set(self.calls.get() + 1);
            if password == Some(self.password) {
                Ok(split_pages(bytes))
            } else {
                Err(AccessError::Denied { reason: "Incorrect password".to_string() }.into())
            }
        }
    }

    fn locked() -> LockedReader {
        LockedReader { password: "secret", calls: Cell::new(0) }
    }

    #[test]
    fn test_split_pages_form_feed() {
        let pages = split_pages(b"page one\n\x0cpage two\n\x0c");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].as_deref(), Ok("page one\n"));
        assert_eq!(pages[1].as_deref(), Ok("page two\n"));
    }

    #[test]
    fn test_split_pages_isolates_bad_utf8() {
        let pages = split_pages(b"ok\x0c\xff\xfe broken\x0cstill ok");
        assert_eq!(pages.len(), 3);
        assert!(pages[0].is_ok());
        assert_eq!(pages[1].as_ref().unwrap_err().page, 1);
        assert!(pages[2].is_ok());
    }

    #[test]
    fn test_retry_succeeds_on_second_attempt() {
        let reader = locked();
        let mut offered = vec!["wrong", "secret"].into_iter();

        let pages = open_with_retry(&reader, b"text", 3, |_| offered.next().map(String::from)).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(reader.calls.get(), 2);
    }

    #[test]
    fn test_retry_cap_exhausted() {
        let reader = locked();

        let err = open_with_retry(&reader, b"text", 3, |_| Some("nope".to_string())).unwrap_err();

        assert_eq!(
            err.downcast_ref::<AccessError>(),
            Some(&AccessError::AttemptsExhausted { attempts: 3 })
        );
        assert_eq!(reader.calls.get(), 3);
    }

    #[test]
    fn test_provider_gives_up() {
        let reader = locked();
        let mut asked = 0;

        let err = open_with_retry(&reader, b"text", 3, |attempt| {
            asked = attempt;
            (attempt == 1).then(|| "wrong".to_string())
        })
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<AccessError>(),
            Some(&AccessError::NoCredential { attempts: 1 })
        );
        assert_eq!(asked, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_staged_document_is_private_and_removed() {
        use std::os::unix::fs::PermissionsExt;

        // Stand-in extractor: prints the staged file's mode and path
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-pdftotext");
        std::fs::write(&script, "#!/bin/sh\nstat -c %a \"$4\"\necho \"$4\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let reader = PdftotextReader { command: script };
        let pages = reader.extract_pages(b"%PDF-1.4 fake", None).unwrap();

        let text = pages[0].as_deref().unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("600"));
        let staged = lines.next().unwrap();
        assert!(staged.ends_with(".pdf"));
        assert!(!Path::new(staged).exists());
    }

    #[test]
    fn test_non_access_error_not_retried() {
        struct Broken;
        impl DocumentReader for Broken {
            fn extract_pages(&self, _: &[u8], _: Option<&str>) -> Result<Vec<PageResult>> {
                bail!("extractor crashed")
            }
        }

        let mut attempts = 0;
        let err = open_with_retry(&Broken, b"", 3, |_| {
            attempts += 1;
            Some(String::new())
        })
        .unwrap_err();

        assert!(err.downcast_ref::<AccessError>().is_none());
        assert_eq!(attempts, 1);
    }
}
