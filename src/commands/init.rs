//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

impl InitOptions {
    /// Resolve where to write from an optional `--config` argument, which may
    /// name either a `.toml` file or a directory
    pub fn from_arg(path: Option<PathBuf>, force: bool) -> Self {
        let (base_dir, config_path) = match path {
            Some(path) if path.extension().is_some_and(|e| e == "toml") => {
                let base = path
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(Config::default_base_dir);
                (base, path)
            }
            Some(dir) => (dir.clone(), dir.join("config.toml")),
            None => {
                let base = Config::default_base_dir();
                (base.clone(), base.join("config.toml"))
            }
        };

        Self {
            base_dir,
            config_path,
            force,
        }
    }
}

/// Write a default configuration file
pub fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized(config_path.display().to_string()));
    }

    let mut config = Config::default();
    config.paths.base_dir = base_dir;
    config.paths.config_file = config_path;

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    Ok(config)
}

/// Print init summary to console
pub fn print_init(config: &Config) {
    println!("✓ docboot initialized");
    println!("  Config: {}", config.paths.config_file.display());
    println!(
        "  Database: {} at {}:{}",
        config.db.name, config.db.connection.host, config.db.connection.port
    );
    println!("\nNext steps:");
    println!("  1. Edit the config file to point at your cluster");
    println!("  2. Check connectivity: docboot ping");
    println!("  3. Provision the database: docboot bootstrap");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let options = InitOptions::from_arg(Some(dir.path().to_path_buf()), false);

        let config = cmd_init(options).unwrap();

        assert_eq!(config.paths.config_file, dir.path().join("config.toml"));
        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.db, config.db);
        assert_eq!(loaded.liveness.timeout_ms, 1000);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docboot.toml");
        std::fs::write(&path, "[db]\nname = \"keep_me\"\n").unwrap();

        let result = cmd_init(InitOptions::from_arg(Some(path.clone()), false));

        assert!(matches!(result, Err(Error::AlreadyInitialized(_))));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("keep_me"));
    }

    #[test]
    fn test_init_force_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docboot.toml");
        std::fs::write(&path, "[db]\nname = \"old\"\n").unwrap();

        let config = cmd_init(InitOptions::from_arg(Some(path.clone()), true)).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.db.name, config.db.name);
        assert_ne!(loaded.db.name, "old");
    }

    #[test]
    fn test_options_from_toml_path() {
        let options = InitOptions::from_arg(Some(PathBuf::from("/etc/docboot/prod.toml")), false);
        assert_eq!(options.base_dir, PathBuf::from("/etc/docboot"));
        assert_eq!(options.config_path, PathBuf::from("/etc/docboot/prod.toml"));
    }
}
