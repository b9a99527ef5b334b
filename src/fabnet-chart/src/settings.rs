//! The two environment-overridable path settings (spec §6), named and
//! defaulted exactly as the original controller's `settings.go`.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Baseline chart root (`$FBOP_PIVT_DIR`), copied into each network's
    /// scratch directory at `Prepare` time.
    pub pivt_dir: PathBuf,
    /// Parent of all per-network scratch directories
    /// (`$FBOP_NETWORK_DIR/<namespace>/<network-name>/`).
    pub network_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pivt_dir: env_or("FBOP_PIVT_DIR", "/opt/fabric-operator/PIVT").into(),
            network_dir: env_or("FBOP_NETWORK_DIR", "/var/fabric-operator/network").into(),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    pub fn network_scratch_dir(&self, namespace: &str, network_name: &str) -> PathBuf {
        self.network_dir.join(namespace).join(network_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_dir_nests_namespace_under_network_dir() {
        let settings = Settings { pivt_dir: "/pivt".into(), network_dir: "/scratch".into() };
        assert_eq!(
            settings.network_scratch_dir("my-ns", "my-network"),
            PathBuf::from("/scratch/my-ns/my-network")
        );
    }

    #[test]
    fn defaults_match_the_original_controller() {
        // Exercised in isolation from the process environment by constructing
        // the struct directly rather than going through `Default`, since env
        // vars are process-global and other tests may set them.
        let settings = Settings { pivt_dir: env_or("FBOP_PIVT_DIR", "/opt/fabric-operator/PIVT").into(), network_dir: "/unused".into() };
        if std::env::var("FBOP_PIVT_DIR").is_err() {
            assert_eq!(settings.pivt_dir, PathBuf::from("/opt/fabric-operator/PIVT"));
        }
    }
}
