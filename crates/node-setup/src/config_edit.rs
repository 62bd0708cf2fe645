//! Idempotent line-oriented config file editing.
//!
//! [`upsert`] replaces whatever a regex matches, or appends the text when
//! nothing matches. When the pattern also matches its own replacement text,
//! running the same upsert twice leaves the file as it was after the first.

use std::fs;
use std::io::Write;
use std::path::Path;

use regex::{NoExpand, Regex, RegexBuilder};
use tracing::debug;

use crate::error::{Result, SetupError};

#[derive(Debug, Clone, Copy)]
pub struct UpsertOptions {
    /// Replace matched spans. When false an existing match is left alone.
    pub replace_if_exists: bool,
    /// Let `.` match newlines, for patterns spanning several lines.
    pub dotall: bool,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            replace_if_exists: true,
            dotall: false,
        }
    }
}

impl UpsertOptions {
    pub fn dotall() -> Self {
        Self {
            dotall: true,
            ..Self::default()
        }
    }

    pub fn keep_existing() -> Self {
        Self {
            replace_if_exists: false,
            ..Self::default()
        }
    }
}

fn compile(pattern: &str, dotall: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .dot_matches_new_line(dotall)
        .build()
        .map_err(|source| SetupError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Apply the upsert to in-memory content. Returns `None` when the content
/// should be left untouched.
pub fn upsert_str(re: &Regex, text: &str, content: &str, replace_if_exists: bool) -> Option<String> {
    if !re.is_match(content) {
        let mut out = String::with_capacity(content.len() + text.len() + 2);
        out.push_str(content);
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
        Some(out)
    } else if replace_if_exists {
        Some(re.replace_all(content, NoExpand(text)).into_owned())
    } else {
        None
    }
}

/// Upsert `text` into every file in `paths`. Files are processed in order and
/// the first failure stops the run; earlier files stay modified.
pub fn upsert<P: AsRef<Path>>(pattern: &str, text: &str, paths: &[P], opts: UpsertOptions) -> Result<()> {
    let re = compile(pattern, opts.dotall)?;
    for path in paths {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SetupError::io(path, e))?;
        match upsert_str(&re, text, &content, opts.replace_if_exists) {
            Some(updated) if updated != content => {
                debug!("config: updating {} ({})", path.display(), pattern);
                write_atomic(path, updated.as_bytes())?;
            }
            _ => debug!("config: {} unchanged ({})", path.display(), pattern),
        }
    }
    Ok(())
}

/// Typed `key=value` upsert for ini-style files. The key is matched
/// literally at the start of a line, with optional spaces before `=`.
pub fn set_key<P: AsRef<Path>>(key: &str, value: &str, paths: &[P]) -> Result<()> {
    let pattern = format!(r"^{}\s*=.*$", regex::escape(key));
    upsert(&pattern, &format!("{}={}", key, value), paths, UpsertOptions::default())
}

/// Read the value of `key` from an ini-style file, if present.
pub fn get_key(path: &Path, key: &str) -> Result<Option<String>> {
    let content = fs::read_to_string(path).map_err(|e| SetupError::io(path, e))?;
    Ok(content.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().to_string())
    }))
}

/// Replace `path` through a sibling temp file and a rename, so a crash never
/// leaves a half-written config. Permission bits and (when allowed)
/// ownership of the original are carried over.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SetupError::io(dir, e))?;
    tmp.write_all(contents).map_err(|e| SetupError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| SetupError::io(tmp.path(), e))?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(|e| SetupError::io(tmp.path(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if let Err(e) = std::os::unix::fs::chown(tmp.path(), Some(meta.uid()), Some(meta.gid())) {
                debug!("config: could not keep owner of {}: {}", path.display(), e);
            }
        }
    }

    tmp.persist(path).map_err(|e| SetupError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_appends_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "host.conf", "multi on");

        upsert(r"^nospoof on$", "nospoof on", &[&path], UpsertOptions::default()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "multi on\nnospoof on\n");
    }

    #[test]
    fn test_appends_to_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "empty.conf", "");

        upsert(r"^a=.*$", "a=1", &[&path], UpsertOptions::default()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a=1\n");
    }

    #[test]
    fn test_replaces_only_matching_line() {
        let temp = TempDir::new().unwrap();
        let original = "[Default]\nrpc-user=rpc\nrpc-password=xcppw1234\nrpc-port=4000\n";
        let path = write(&temp, "counterparty.conf", original);

        upsert(r"^rpc-password=.*?$", "rpc-password=s3cret", &[&path], UpsertOptions::default()).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[Default]\nrpc-user=rpc\nrpc-password=s3cret\nrpc-port=4000\n"
        );
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "auditd", "# comment\nUSE_AUGENRULES=\"no\"\nFOO=1");

        upsert(r"^USE_AUGENRULES=.*?$", "USE_AUGENRULES=\"yes\"", &[&path], UpsertOptions::default()).unwrap();
        let once = fs::read_to_string(&path).unwrap();
        upsert(r"^USE_AUGENRULES=.*?$", "USE_AUGENRULES=\"yes\"", &[&path], UpsertOptions::default()).unwrap();

        assert_eq!(once, "# comment\nUSE_AUGENRULES=\"yes\"\nFOO=1");
        assert_eq!(once, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn test_set_key_appends_once() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "counterblock.conf", "[Default]\n");

        set_key("rpc-host", "0.0.0.0", &[&path]).unwrap();
        set_key("rpc-host", "0.0.0.0", &[&path]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[Default]\nrpc-host=0.0.0.0\n");
    }

    #[test]
    fn test_keep_existing_leaves_file_alone() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "a.conf", "key=old\n");

        upsert(r"^key=.*$", "key=new", &[&path], UpsertOptions::keep_existing()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "key=old\n");
    }

    #[test]
    fn test_dotall_spans_lines() {
        let temp = TempDir::new().unwrap();
        let path = write(
            &temp,
            "before.rules",
            "*filter\n# End required lines\n\n# allow all on loopback\n-A ufw-before-input -i lo -j ACCEPT\n",
        );
        let replacement = "# End required lines\n\n#CUSTOM: for psad\n-A INPUT -j LOG\n-A FORWARD -j LOG\n\n# allow all on loopback";

        upsert(
            r"^# End required lines.*?# allow all on loopback$",
            replacement,
            &[&path],
            UpsertOptions::dotall(),
        )
        .unwrap();
        let once = fs::read_to_string(&path).unwrap();
        assert!(once.contains("#CUSTOM: for psad\n-A INPUT -j LOG\n"));
        assert!(once.ends_with("-A ufw-before-input -i lo -j ACCEPT\n"));

        upsert(
            r"^# End required lines.*?# allow all on loopback$",
            replacement,
            &[&path],
            UpsertOptions::dotall(),
        )
        .unwrap();
        assert_eq!(once, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn test_replacement_is_literal() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "a.conf", "pw=x\n");

        set_key("pw", "a$1b", &[&path]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "pw=a$1b\n");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nope.conf");
        let err = set_key("a", "b", &[&path]).unwrap_err();
        assert!(matches!(err, SetupError::Io { .. }));
    }

    #[test]
    fn test_bad_pattern() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "a.conf", "");
        let err = upsert("(unclosed", "x", &[&path], UpsertOptions::default()).unwrap_err();
        assert!(matches!(err, SetupError::Pattern { .. }));
    }

    #[test]
    fn test_get_key() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "bitcoin.conf", "rpcuser=rpc\nrpcpassword = abc \n");
        assert_eq!(get_key(&path, "rpcpassword").unwrap().as_deref(), Some("abc"));
        assert_eq!(get_key(&path, "missing").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_preserved() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "a.conf", "a=1\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o660)).unwrap();

        set_key("a", "2", &[&path]).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o660);
    }
}
