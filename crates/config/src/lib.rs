use std::path::PathBuf;
use serde::Deserialize;

/// All configuration for the raffle manager.
///
/// Precedence (lowest to highest): defaults → config file → env var → CLI arg.
/// CLI arg merging is done by the caller after `Config::load()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Storage
    pub data_dir: PathBuf,

    // Server
    pub port: u16,
    /// Largest request body accepted, image uploads included.
    pub max_body_bytes: usize,

    // Logging
    pub log_level: String,
    pub utc: bool,

    // Exports
    pub font_path: PathBuf,
    pub export_dir: PathBuf,
}

/// Config file layout (~/.rifas/config.toml). All fields optional; they layer
/// on top of compiled-in defaults.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    port: Option<u16>,
    max_body_bytes: Option<usize>,
    log_level: Option<String>,
    utc: Option<bool>,
    font_path: Option<PathBuf>,
    export_dir: Option<PathBuf>,
}

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

impl Config {
    /// Config directory: ~/.rifas/
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rifas")
    }

    /// Config file path: ~/.rifas/config.toml
    pub fn file_path() -> PathBuf {
        Self::dir().join("config.toml")
    }

    /// Load config: defaults → config file → env vars.
    /// CLI args should be merged by the caller afterward.
    pub fn load() -> Self {
        let mut config = Self::defaults();

        // Layer 2: config file. Logging is not up yet, so problems go to stderr.
        let path = Self::file_path();
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match toml::from_str::<FileConfig>(&contents) {
                Ok(file) => config.apply_file(file),
                Err(e) => eprintln!("warning: ignoring {}: {e}", path.display()),
            }
        }

        // Layer 3: environment variables
        config.apply_env(|key| std::env::var(key).ok());

        config
    }

    pub fn defaults() -> Self {
        Self {
            data_dir: Self::dir().join("data"),
            port: 3000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_level: "info".to_string(),
            utc: false,
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            export_dir: PathBuf::from("."),
        }
    }

    // --- Private helpers ---

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.data_dir { self.data_dir = v; }
        if let Some(v) = file.port { self.port = v; }
        if let Some(v) = file.max_body_bytes { self.max_body_bytes = v; }
        if let Some(v) = file.log_level { self.log_level = v; }
        if let Some(v) = file.utc { self.utc = v; }
        if let Some(v) = file.font_path { self.font_path = v; }
        if let Some(v) = file.export_dir { self.export_dir = v; }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("RIFAS_DATA_DIR") { self.data_dir = v.into(); }
        if let Some(v) = var("RIFAS_PORT") {
            if let Ok(p) = v.parse() { self.port = p; }
        }
        if let Some(v) = var("RIFAS_MAX_BODY_BYTES") {
            if let Ok(n) = v.parse() { self.max_body_bytes = n; }
        }
        if let Some(v) = var("RIFAS_LOG_LEVEL") { self.log_level = v; }
        if let Some(v) = var("RIFAS_UTC") {
            self.utc = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("RIFAS_FONT_PATH") { self.font_path = v.into(); }
        if let Some(v) = var("RIFAS_EXPORT_DIR") { self.export_dir = v.into(); }
    }
}
