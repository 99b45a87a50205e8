pub mod analysis;

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub app_db_path: PathBuf,
}

impl DbConfig {
    pub fn new(app_db_path: impl Into<PathBuf>) -> Self {
        Self {
            app_db_path: app_db_path.into(),
        }
    }
}

pub fn resolve_db_config(repo_root: &Path) -> DbConfig {
    let sqlite_path = std::env::var("MATERIA_BACKEND_DB").ok();
    select_db_config(sqlite_path.as_deref(), repo_root)
}

fn select_db_config(sqlite_path: Option<&str>, repo_root: &Path) -> DbConfig {
    let raw = sqlite_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| String::from("var/backend/app.db"));
    let candidate = PathBuf::from(raw);
    let absolute = if candidate.is_absolute() {
        candidate
    } else {
        repo_root.join(candidate)
    };
    DbConfig::new(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_lives_under_the_repo_root() {
        let cfg = select_db_config(None, Path::new("/tmp/repo"));
        assert_eq!(cfg.app_db_path, PathBuf::from("/tmp/repo/var/backend/app.db"));
    }

    #[test]
    fn absolute_override_is_used_verbatim() {
        let cfg = select_db_config(Some("/data/materia.db"), Path::new("/tmp/repo"));
        assert_eq!(cfg.app_db_path, PathBuf::from("/data/materia.db"));
    }

    #[test]
    fn blank_override_falls_back_to_default() {
        let cfg = select_db_config(Some("   "), Path::new("/tmp/repo"));
        assert_eq!(cfg.app_db_path, PathBuf::from("/tmp/repo/var/backend/app.db"));
    }
}
