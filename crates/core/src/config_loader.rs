use crate::config::KeeperConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads keeper configuration by merging defaults, a TOML file, and
    /// `KEEPER_`-prefixed environment variables (highest precedence).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<KeeperConfig> {
        let config: KeeperConfig = Figment::from(Serialized::defaults(KeeperConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("KEEPER_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Loads configuration with an additional profile overlay file, e.g.
    /// `Keeper.staging.toml` next to the base file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(path: &str, profile: &str) -> Result<KeeperConfig> {
        let overlay = match path.rsplit_once(".toml") {
            Some((stem, _)) => format!("{stem}.{profile}.toml"),
            None => format!("{path}.{profile}"),
        };
        let config: KeeperConfig = Figment::from(Serialized::defaults(KeeperConfig::default()))
            .merge(Toml::file(path))
            .merge(Toml::file(overlay))
            .merge(Env::prefixed("KEEPER_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::load_from("/nonexistent/Keeper.toml").unwrap();
        assert_eq!(config.keeper.poll_interval_secs, 10);
        assert!(config.watch.is_empty());
    }
}
