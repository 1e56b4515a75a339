//! External subprocess engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Program, working directory, and output artifact for one external engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCommandConfig {
    /// Program to invoke (binary name or path, resolved against `work_dir`)
    pub program: String,
    /// Working directory the subprocess runs in
    pub work_dir: PathBuf,
    /// Output artifact the subprocess writes, relative to `work_dir`
    pub artifact: String,
}

impl EngineCommandConfig {
    fn new(program: &str, work_dir: &str, artifact: &str) -> Self {
        Self {
            program: program.to_string(),
            work_dir: PathBuf::from(work_dir),
            artifact: artifact.to_string(),
        }
    }

    /// Absolute-ish path of the artifact the engine produces.
    pub fn artifact_path(&self) -> PathBuf {
        self.work_dir.join(&self.artifact)
    }
}

/// Configuration for the three subprocess engines and their Tor endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// Wall-clock budget for one subprocess run (seconds)
    pub timeout_secs: u64,
    /// Tor SOCKS5 host the engines route through
    pub socks_host: String,
    /// Tor SOCKS5 port
    pub socks_port: u16,
    /// TOC deep crawler
    #[serde(default = "default_toc")]
    pub toc: EngineCommandConfig,
    /// OnionSearch multi-engine search
    #[serde(default = "default_onionsearch")]
    pub onionsearch: EngineCommandConfig,
    /// TorBot OSINT crawler
    #[serde(default = "default_torbot")]
    pub torbot: EngineCommandConfig,
}

impl EnginesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_toc() -> EngineCommandConfig {
    EngineCommandConfig::new("./toc", "onions/toc-main", "toc_output.json")
}

fn default_onionsearch() -> EngineCommandConfig {
    EngineCommandConfig::new("onionsearch", "onions/OnionSearch-master", "onionsearch_output.csv")
}

fn default_torbot() -> EngineCommandConfig {
    EngineCommandConfig::new("python3", "onions/TorBot-dev", "torbot_output.json")
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            socks_host: "127.0.0.1".to_string(),
            socks_port: 9050,
            toc: default_toc(),
            onionsearch: default_onionsearch(),
            torbot: default_torbot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_is_relative_to_work_dir() {
        let cfg = EngineCommandConfig::new("./toc", "onions/toc-main", "out.json");
        assert_eq!(cfg.artifact_path(), PathBuf::from("onions/toc-main/out.json"));
    }

    #[test]
    fn default_timeout_is_ten_minutes() {
        assert_eq!(EnginesConfig::default().timeout(), Duration::from_secs(600));
    }
}
