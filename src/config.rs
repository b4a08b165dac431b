//! Flat `key = value` configuration file.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "cfg.txt";

const KEY_DOWNLOAD_DIR: &str = "dwn_path";
const KEY_TRANSCODER: &str = "ffmpeg_path";
const KEY_EXTRACTOR: &str = "ytdlp_path";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {0} not found")]
    Missing(PathBuf),

    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("key not found: {0}")]
    KeyNotFound(String),
}

/// A line that could not be parsed and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number
    pub line: usize,
    pub content: String,
}

/// Raw key/value pairs read from a config file
#[derive(Debug, Default, Clone)]
pub struct ConfigFile {
    values: HashMap<String, String>,
    warnings: Vec<ParseWarning>,
}

impl ConfigFile {
    /// Reads and parses `path`. A missing file is reported as [`ConfigError::Missing`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::parse(&text))
    }

    /// Parses config text. Blank lines and `#` comments are ignored; lines
    /// without `=` are skipped and recorded as warnings.
    pub fn parse(text: &str) -> Self {
        let mut parsed = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    parsed
                        .values
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                None => parsed.warnings.push(ParseWarning {
                    line: idx + 1,
                    content: line.to_string(),
                }),
            }
        }
        parsed
    }

    pub fn get(&self, key: &str) -> Result<&str, ConfigError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }
}

/// Process-wide settings, built once at startup and shared read-only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where temporary tracks and final outputs are written
    pub download_dir: PathBuf,
    /// ffmpeg executable
    pub transcoder_path: PathBuf,
    /// yt-dlp executable
    pub extractor_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let transcoder = if cfg!(target_os = "windows") { "ffmpeg.exe" } else { "ffmpeg" };
        Self {
            download_dir: PathBuf::from("."),
            transcoder_path: PathBuf::from(transcoder),
            extractor_path: PathBuf::from("yt-dlp"),
        }
    }
}

impl Config {
    /// Builds settings from a parsed file; absent keys keep their defaults.
    pub fn from_file(file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, fallback: PathBuf| {
            file.get(key).map(PathBuf::from).unwrap_or(fallback)
        };
        Self {
            download_dir: pick(KEY_DOWNLOAD_DIR, defaults.download_dir),
            transcoder_path: pick(KEY_TRANSCODER, defaults.transcoder_path),
            extractor_path: pick(KEY_EXTRACTOR, defaults.extractor_path),
        }
    }

    /// Loads `path`, falling back to defaults when the file is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match ConfigFile::load(path) {
            Ok(file) => {
                for w in file.warnings() {
                    tracing::warn!(line = w.line, content = %w.content, "skipping malformed config line");
                }
                let config = Self::from_file(&file);
                tracing::info!(?config, "loaded config from {}", path.display());
                config
            }
            Err(ConfigError::Missing(p)) => {
                tracing::info!("{} not found, using default settings", p.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("{e}; using default settings");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_keys_and_values() {
        let file = ConfigFile::parse("dwn_path =  /tmp/videos \r\nffmpeg_path=C:\\bin\\ffmpeg.exe\n");
        assert_eq!(file.get("dwn_path").unwrap(), "/tmp/videos");
        assert_eq!(file.get("ffmpeg_path").unwrap(), "C:\\bin\\ffmpeg.exe");
        assert!(file.warnings().is_empty());
    }

    #[test]
    fn unknown_key_lookup_fails() {
        let file = ConfigFile::parse("a = b");
        assert!(matches!(file.get("missing"), Err(ConfigError::KeyNotFound(k)) if k == "missing"));
    }

    #[test]
    fn malformed_lines_become_warnings() {
        let file = ConfigFile::parse("# comment\n\nnot a pair\ndwn_path = out\n");
        assert_eq!(file.get("dwn_path").unwrap(), "out");
        assert_eq!(
            file.warnings(),
            &[ParseWarning {
                line: 3,
                content: "not a pair".to_string()
            }]
        );
    }

    #[test]
    fn value_may_contain_equals() {
        let file = ConfigFile::parse("dwn_path = a=b");
        assert_eq!(file.get("dwn_path").unwrap(), "a=b");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.txt");
        assert!(matches!(ConfigFile::load(&path), Err(ConfigError::Missing(_))));

        let config = Config::load_or_default(&path);
        assert_eq!(config, Config::default());
        assert_eq!(config.download_dir, PathBuf::from("."));
    }

    #[test]
    fn load_reads_recognized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.txt");
        fs::write(&path, "dwn_path = downloads\nffmpeg_path = /usr/bin/ffmpeg\nextra = 1\n").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.transcoder_path, PathBuf::from("/usr/bin/ffmpeg"));
        assert_eq!(config.extractor_path, Config::default().extractor_path);
    }
}
