//! Parse and load user configuration.

use std::{fs, path::Path};

use tracing::debug;

use crate::{Config, Error, error::excerpt_at, resolve_config_path};

/// Parse a configuration from RON text and validate it.
pub fn from_ron(text: &str) -> Result<Config, Error> {
    let cfg: Config = ron::from_str(text).map_err(|e| {
        let line = e.span.start.line;
        let col = e.span.start.col;
        Error::Parse {
            path: None,
            line,
            col,
            message: e.code.to_string(),
            excerpt: excerpt_at(text, line, col),
        }
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate a configuration from the RON file at `path`.
pub fn load_from_path(path: &Path) -> Result<Config, Error> {
    let text = fs::read_to_string(path).map_err(|e| Error::Read {
        path: Some(path.to_path_buf()),
        message: e.to_string(),
    })?;
    from_ron(&text).map_err(|e| e.with_path(path))
}

/// Load the effective configuration following [`resolve_config_path`].
pub fn load(explicit: Option<&Path>) -> Result<Config, Error> {
    match resolve_config_path(explicit) {
        Some(path) => {
            debug!(path = %path.display(), "config_loading");
            load_from_path(&path)
        }
        None => {
            debug!("config_defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_temp(text: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        f
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = from_ron("(restore_on_exit: false, join_timeout_ms: Some(500))").unwrap();
        assert!(!cfg.restore_on_exit);
        assert_eq!(cfg.join_timeout_ms, Some(500));
        assert_eq!(cfg.ready_timeout_ms, crate::DEFAULT_READY_TIMEOUT_MS);
    }

    #[test]
    fn empty_struct_is_all_defaults() {
        assert_eq!(from_ron("()").unwrap(), Config::default());
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = from_ron("(\n  restore_on_exti: true,\n)").unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn load_from_path_attaches_path() {
        let f = write_temp("(ready_timeout_ms: 0)");
        let err = load_from_path(f.path()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.path(), Some(f.path()));
        assert!(err.pretty().contains("ready_timeout_ms"));
    }

    #[test]
    fn load_reads_explicit_file() {
        let f = write_temp("(reentrancy_limit: 2)");
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.reentrancy_limit, 2);
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.ron");
        let err = load(Some(&missing)).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert_eq!(err.path(), Some(missing.as_path()));
    }
}
