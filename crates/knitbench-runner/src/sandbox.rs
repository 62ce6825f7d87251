//! Throwaway working directory for a single candidate program.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use knitbench_core::model::Language;

/// Variables passed through from the parent environment. Everything else,
/// API keys included, is cleared before the child starts.
const PASSTHROUGH_VARS: &[&str] = &["PATH", "LANG", "LC_ALL", "TMPDIR", "SYSTEMROOT"];

/// Extra variables the trusted compiler sees, so toolchain managers such as
/// rustup can find their install.
const TOOLCHAIN_VARS: &[&str] = &["HOME", "RUSTUP_HOME", "CARGO_HOME", "RUSTUP_TOOLCHAIN"];

/// A temporary directory holding one program's source and build output.
///
/// On drop, the temporary directory is automatically cleaned up.
pub struct Sandbox {
    work_dir: TempDir,
    language: Language,
}

impl Sandbox {
    pub fn new(language: Language) -> Result<Self> {
        let work_dir = tempfile::Builder::new()
            .prefix("knitbench-")
            .tempdir()
            .context("failed to create sandbox directory")?;
        Ok(Self { work_dir, language })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Path of the source file for this sandbox's language.
    pub fn source_path(&self) -> PathBuf {
        let name = match self.language {
            Language::Python => "main.py",
            Language::Rust => "main.rs",
        };
        self.work_dir.path().join(name)
    }

    /// Path the compiled binary is written to.
    pub fn binary_path(&self) -> PathBuf {
        let name = if cfg!(windows) { "candidate.exe" } else { "candidate" };
        self.work_dir.path().join(name)
    }

    pub fn write_source(&self, code: &str) -> Result<PathBuf> {
        let path = self.source_path();
        std::fs::write(&path, code)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Environment for child processes. Callers must `env_clear()` first.
    pub fn build_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = PASSTHROUGH_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok().map(|val| (var.to_string(), val)))
            .collect();
        env.push((
            "HOME".to_string(),
            self.work_dir.path().to_string_lossy().to_string(),
        ));
        if self.language == Language::Python {
            env.push(("PYTHONDONTWRITEBYTECODE".into(), "1".into()));
            env.push(("PYTHONHASHSEED".into(), "0".into()));
        }
        env
    }

    /// Environment for the compiler: the candidate environment with the
    /// parent's toolchain variables (including `HOME`) restored.
    pub fn compiler_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .build_env()
            .into_iter()
            .filter(|(key, _)| !TOOLCHAIN_VARS.contains(&key.as_str()))
            .collect();
        env.extend(
            TOOLCHAIN_VARS
                .iter()
                .filter_map(|var| std::env::var(var).ok().map(|val| (var.to_string(), val))),
        );
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_file_follows_language() {
        let py = Sandbox::new(Language::Python).unwrap();
        let path = py.write_source("print(1)").unwrap();
        assert!(path.ends_with("main.py"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "print(1)");

        let rs = Sandbox::new(Language::Rust).unwrap();
        assert!(rs.source_path().ends_with("main.rs"));
        assert!(rs.binary_path().starts_with(rs.work_dir()));
    }

    #[test]
    fn directory_is_removed_on_drop() {
        let sandbox = Sandbox::new(Language::Python).unwrap();
        let dir = sandbox.work_dir().to_path_buf();
        assert!(dir.exists());
        drop(sandbox);
        assert!(!dir.exists());
    }

    #[test]
    fn env_keeps_only_safe_variables() {
        let sandbox = Sandbox::new(Language::Python).unwrap();
        let env = sandbox.build_env();
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        for (key, _) in &env {
            assert!(
                PASSTHROUGH_VARS.contains(&key.as_str())
                    || ["HOME", "PYTHONDONTWRITEBYTECODE", "PYTHONHASHSEED"].contains(&key.as_str()),
                "unexpected variable {key}"
            );
        }
        assert!(keys.contains(&"HOME"));
        assert!(!keys.iter().any(|k| k.contains("KEY") || k.contains("TOKEN")));
    }

    #[test]
    fn compiler_env_restores_parent_home() {
        let sandbox = Sandbox::new(Language::Rust).unwrap();
        let env = sandbox.compiler_env();
        let homes: Vec<&String> = env.iter().filter(|(k, _)| k == "HOME").map(|(_, v)| v).collect();
        assert!(homes.len() <= 1);
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(homes, [&home]);
        }
        assert!(!env.iter().any(|(k, _)| k.contains("KEY") || k.contains("TOKEN")));
    }
}
