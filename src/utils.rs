use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let root = base.join("ticket-scout");
    if let Err(err) = fs::create_dir_all(&root) {
        warn!(path = ?root, %err, "failed to create data root");
    }
    root
});

/// Per-user directory holding the scratch database and config file.
pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn database_path() -> PathBuf {
    data_root().join("scratch.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!(path = ?parent, %err, "failed to create parent directory");
        }
    }
}

/// Lower-cases `name` and collapses every whitespace run into one hyphen.
pub fn slugify(name: &str) -> String {
    static WHITESPACE_RE: Lazy<regex::Regex> =
        Lazy::new(|| regex::Regex::new(r"\s+").expect("valid whitespace regex"));
    WHITESPACE_RE
        .replace_all(&name.to_lowercase(), "-")
        .into_owned()
}
