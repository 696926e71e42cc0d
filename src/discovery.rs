//! CLI discovery: locating the `claude` binary and checking its version.
//!
//! [`find_cli()`] tries `$PATH` first (`which::which`), then a short list of
//! install locations used by npm, yarn and the Claude installer.
//! [`check_cli_version()`] runs `claude --version` and extracts the version;
//! [`ensure_cli_version()`] additionally enforces [`MIN_CLI_VERSION`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use claude_query::discovery::{ensure_cli_version, find_cli};
//!
//! # async fn example() -> claude_query::Result<()> {
//! let cli = find_cli()?;
//! let version = ensure_cli_version(&cli, Some(Duration::from_secs(5))).await?;
//! println!("claude {version} at {}", cli.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Error, Result};

/// Oldest CLI release that supports `--output-format stream-json --verbose`.
pub const MIN_CLI_VERSION: &str = "1.0.0";

#[cfg(not(windows))]
const CLI_NAME: &str = "claude";
#[cfg(windows)]
const CLI_NAME: &str = "claude.exe";

/// Locate the Claude Code CLI binary.
///
/// Order: `which claude`, then (relative to the home directory unless
/// absolute) `.npm-global/bin`, `/usr/local/bin`, `.local/bin`,
/// `node_modules/.bin` in the current directory, `.yarn/bin`,
/// `.claude/local`. On Windows the npm and scoop shim directories replace
/// the Unix-only entries.
///
/// # Errors
///
/// [`Error::CliNotFound`] if no candidate is an existing file.
pub fn find_cli() -> Result<PathBuf> {
    if let Ok(path) = which::which("claude") {
        tracing::debug!(path = %path.display(), "found CLI on PATH");
        return Ok(path);
    }

    candidate_paths(home_dir().as_deref())
        .into_iter()
        .find(|candidate| candidate.is_file())
        .inspect(|path| tracing::debug!(path = %path.display(), "found CLI at fallback location"))
        .ok_or(Error::CliNotFound)
}

/// Fallback install locations, in priority order.
fn candidate_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let in_home = |rel: &str| home.map(|h| h.join(rel).join(CLI_NAME));
    let local = Some(PathBuf::from("node_modules/.bin").join(CLI_NAME));

    #[cfg(not(windows))]
    let candidates = [
        in_home(".npm-global/bin"),
        Some(PathBuf::from("/usr/local/bin").join(CLI_NAME)),
        in_home(".local/bin"),
        local,
        in_home(".yarn/bin"),
        in_home(".claude/local"),
    ];
    #[cfg(windows)]
    let candidates = [
        in_home("AppData/Roaming/npm"),
        local,
        in_home("scoop/shims"),
        in_home(".claude/local"),
    ];

    candidates.into_iter().flatten().collect()
}

/// Run `<cli> --version` and return the version it reports.
///
/// If `timeout` is `Some`, the process is killed once it expires.
///
/// # Errors
///
/// - [`Error::SpawnFailed`] if the process cannot be launched.
/// - [`Error::Timeout`] if the deadline expires.
/// - [`Error::ProcessExited`] on a non-zero exit.
/// - [`Error::Protocol`] if no version can be found in the output.
pub async fn check_cli_version(cli_path: &Path, timeout: Option<Duration>) -> Result<String> {
    let mut child = tokio::process::Command::new(cli_path)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(Error::SpawnFailed)?;

    if let Some(d) = timeout {
        if tokio::time::timeout(d, child.wait()).await.is_err() {
            let _ = child.kill().await;
            return Err(Error::Timeout(format!(
                "version check timed out after {}s",
                d.as_secs_f64()
            )));
        }
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(Error::ProcessExited {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version(&stdout)
        .ok_or_else(|| Error::protocol("no version in `--version` output", stdout.trim()))
}

/// [`check_cli_version()`], then require at least [`MIN_CLI_VERSION`].
///
/// # Errors
///
/// Everything [`check_cli_version()`] returns, plus
/// [`Error::VersionMismatch`] for an older CLI.
pub async fn ensure_cli_version(cli_path: &Path, timeout: Option<Duration>) -> Result<String> {
    let found = check_cli_version(cli_path, timeout).await?;
    if !version_satisfies(&found, MIN_CLI_VERSION) {
        return Err(Error::VersionMismatch {
            found,
            required: MIN_CLI_VERSION.to_owned(),
        });
    }
    Ok(found)
}

/// `true` if `version >= minimum`, comparing `major.minor.patch`.
///
/// Missing or non-numeric components count as zero; pre-release suffixes
/// are ignored.
#[must_use]
pub fn version_satisfies(version: &str, minimum: &str) -> bool {
    fn triple(s: &str) -> (u32, u32, u32) {
        let core = s.split('-').next().unwrap_or_default();
        let mut parts = core.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        let mut next = || parts.next().unwrap_or(0);
        (next(), next(), next())
    }
    triple(version) >= triple(minimum)
}

// ── Internals ────────────────────────────────────────────────────────────────

/// First `N.N[.N][-pre]` token in `output`, without a leading `v`.
fn parse_version(output: &str) -> Option<String> {
    output.split_whitespace().find_map(|word| {
        let word = word.strip_prefix('v').unwrap_or(word);
        if !word.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let version: String = word
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
            .collect();
        (version.split('.').count() >= 2).then_some(version)
    })
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    let var = "USERPROFILE";
    #[cfg(not(windows))]
    let var = "HOME";
    std::env::var_os(var).map(PathBuf::from)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_formats() {
        assert_eq!(parse_version("1.2.3"), Some("1.2.3".into()));
        assert_eq!(parse_version("v1.2.3"), Some("1.2.3".into()));
        assert_eq!(
            parse_version("1.0.98 (Claude Code)"),
            Some("1.0.98".into())
        );
        assert_eq!(parse_version("claude v2.0.0-beta.1"), Some("2.0.0-beta.1".into()));
    }

    #[test]
    fn parse_version_rejects_non_versions() {
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("no version here"), None);
        assert_eq!(parse_version("build 42"), None);
    }

    #[test]
    fn version_comparison() {
        assert!(version_satisfies("1.0.0", "1.0.0"));
        assert!(version_satisfies("1.0.1", "1.0.0"));
        assert!(version_satisfies("2.0.0", "1.9.9"));
        assert!(version_satisfies("2.0.0-beta.1", "2.0.0"));
        assert!(!version_satisfies("0.9.9", "1.0.0"));
        assert!(!version_satisfies("1.9", "1.9.1"));
    }

    #[cfg(not(windows))]
    #[test]
    fn candidates_are_ordered_and_rooted_at_home() {
        let candidates = candidate_paths(Some(Path::new("/home/u")));
        assert_eq!(candidates[0], PathBuf::from("/home/u/.npm-global/bin/claude"));
        assert_eq!(candidates[1], PathBuf::from("/usr/local/bin/claude"));
        assert_eq!(candidates.len(), 6);

        // Without a home directory only the absolute and relative entries remain.
        assert_eq!(candidate_paths(None).len(), 2);
    }

    #[test]
    fn find_cli_returns_file_or_not_found() {
        match find_cli() {
            Ok(path) => assert!(path.is_file()),
            Err(Error::CliNotFound) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn check_cli_version_reads_output() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(&dir, "claude", "echo '1.0.98 (Claude Code)'");
        assert_eq!(check_cli_version(&cli, None).await.unwrap(), "1.0.98");
        assert_eq!(ensure_cli_version(&cli, None).await.unwrap(), "1.0.98");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ensure_cli_version_rejects_old_cli() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(&dir, "claude", "echo 0.2.9");
        let err = ensure_cli_version(&cli, None).await.unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { ref found, .. } if found == "0.2.9"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unparseable_output_is_a_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(&dir, "noop", "exit 0");
        let err = check_cli_version(&cli, None).await.unwrap_err();
        assert!(err.is_protocol(), "got: {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn check_cli_version_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(&dir, "slow", "sleep 999");
        let err = check_cli_version(&cli, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got: {err:?}");
    }
}
