//! Settings for a harness run.
//!
//! Every value can come from the command line, the environment, or the
//! Solana CLI config file, in that order of precedence, before falling back to
//! the defaults below.

use {
    crate::error::{Error, Result},
    solana_clap_utils::input_validators::normalize_to_url_if_moniker,
    solana_sdk::{commitment_config::CommitmentConfig, native_token::sol_to_lamports},
    std::{path::PathBuf, str::FromStr, time::Duration},
};

pub const DEFAULT_JSON_RPC_URL: &str = "http://localhost:8899";
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub const ENV_RPC_URL: &str = "DURABLE_NONCE_RPC_URL";
pub const ENV_COMMITMENT: &str = "DURABLE_NONCE_COMMITMENT";
pub const ENV_AIRDROP_LAMPORTS: &str = "DURABLE_NONCE_AIRDROP_LAMPORTS";
pub const ENV_TRANSFER_LAMPORTS: &str = "DURABLE_NONCE_TRANSFER_LAMPORTS";
pub const ENV_FUNDING_KEYPAIR: &str = "DURABLE_NONCE_FUNDING_KEYPAIR";
pub const ENV_CONFIRM_TIMEOUT_SECS: &str = "DURABLE_NONCE_CONFIRM_TIMEOUT_SECS";

pub fn default_airdrop_lamports() -> u64 {
    sol_to_lamports(1.0)
}

pub fn default_transfer_lamports() -> u64 {
    sol_to_lamports(0.001)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub json_rpc_url: String,
    pub commitment: CommitmentConfig,
    /// Lamports requested for the payer of every scenario.
    pub airdrop_lamports: u64,
    /// Lamports moved by the transfer instruction that rides along with the
    /// nonce advance.
    pub transfer_lamports: u64,
    /// Fund payers from this keypair instead of requesting airdrops.
    pub funding_keypair: Option<PathBuf>,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    /// Make the deferred scenario wait until the signing-time blockhash has
    /// expired, which takes roughly a minute on a live cluster.
    pub wait_for_blockhash_expiry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            json_rpc_url: DEFAULT_JSON_RPC_URL.to_string(),
            commitment: CommitmentConfig::confirmed(),
            airdrop_lamports: default_airdrop_lamports(),
            transfer_lamports: default_transfer_lamports(),
            funding_keypair: None,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_for_blockhash_expiry: false,
        }
    }
}

/// Raw settings gathered from the command line and environment. `None`
/// means "not given" so the config file and defaults can fill in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub json_rpc_url: Option<String>,
    pub commitment: Option<String>,
    pub airdrop_lamports: Option<u64>,
    pub transfer_lamports: Option<u64>,
    pub funding_keypair: Option<PathBuf>,
    pub confirm_timeout_secs: Option<u64>,
    pub wait_for_blockhash_expiry: bool,
}

impl Config {
    /// Configuration for an in-process test validator with a faucet.
    pub fn for_local_validator(json_rpc_url: String) -> Self {
        Self {
            json_rpc_url,
            commitment: CommitmentConfig::processed(),
            poll_interval: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Merges `overrides` over the values found in the Solana CLI config file,
    /// if there is one.
    pub fn resolve(
        overrides: ConfigOverrides,
        cli_config: Option<&solana_cli_config::Config>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let json_rpc_url = overrides
            .json_rpc_url
            .or_else(|| cli_config.and_then(|config| non_empty(&config.json_rpc_url)))
            .map(normalize_to_url_if_moniker)
            .unwrap_or(defaults.json_rpc_url);

        let commitment = match overrides
            .commitment
            .or_else(|| cli_config.and_then(|config| non_empty(&config.commitment)))
        {
            Some(commitment) => CommitmentConfig::from_str(&commitment)
                .map_err(|_| Error::Config(format!("invalid commitment: {commitment}")))?,
            None => defaults.commitment,
        };

        let config = Self {
            json_rpc_url,
            commitment,
            airdrop_lamports: overrides
                .airdrop_lamports
                .unwrap_or(defaults.airdrop_lamports),
            transfer_lamports: overrides
                .transfer_lamports
                .unwrap_or(defaults.transfer_lamports),
            funding_keypair: overrides.funding_keypair,
            confirm_timeout: overrides
                .confirm_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.confirm_timeout),
            poll_interval: defaults.poll_interval,
            wait_for_blockhash_expiry: overrides.wait_for_blockhash_expiry,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transfer_lamports == 0 {
            return Err(Error::Config("transfer amount must be non-zero".to_string()));
        }
        if self.airdrop_lamports <= self.transfer_lamports {
            return Err(Error::Config(format!(
                "airdrop of {} lamports does not cover a transfer of {} lamports",
                self.airdrop_lamports, self.transfer_lamports
            )));
        }
        if self.confirm_timeout.is_zero() {
            return Err(Error::Config("confirm timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use {super::*, solana_sdk::commitment_config::CommitmentLevel};

    #[test]
    fn test_resolve_defaults() {
        let config = Config::resolve(ConfigOverrides::default(), None).unwrap();
        assert_eq!(config, Config::default());

        let blank_cli_config = solana_cli_config::Config {
            json_rpc_url: String::new(),
            commitment: String::new(),
            ..solana_cli_config::Config::default()
        };
        let config = Config::resolve(ConfigOverrides::default(), Some(&blank_cli_config)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_resolve_prefers_overrides_over_config_file() {
        let cli_config = solana_cli_config::Config {
            json_rpc_url: "http://cli-config.example:8899".to_string(),
            commitment: "finalized".to_string(),
            ..solana_cli_config::Config::default()
        };

        let config = Config::resolve(ConfigOverrides::default(), Some(&cli_config)).unwrap();
        assert_eq!(config.json_rpc_url, "http://cli-config.example:8899");
        assert_eq!(config.commitment.commitment, CommitmentLevel::Finalized);

        let overrides = ConfigOverrides {
            json_rpc_url: Some("http://override.example:8899".to_string()),
            commitment: Some("processed".to_string()),
            confirm_timeout_secs: Some(5),
            ..ConfigOverrides::default()
        };
        let config = Config::resolve(overrides, Some(&cli_config)).unwrap();
        assert_eq!(config.json_rpc_url, "http://override.example:8899");
        assert_eq!(config.commitment.commitment, CommitmentLevel::Processed);
        assert_eq!(config.confirm_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_resolve_normalizes_monikers() {
        let overrides = ConfigOverrides {
            json_rpc_url: Some("devnet".to_string()),
            ..ConfigOverrides::default()
        };
        let config = Config::resolve(overrides, None).unwrap();
        assert_eq!(config.json_rpc_url, "https://api.devnet.solana.com");
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let overrides = ConfigOverrides {
            commitment: Some("eventually".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            Config::resolve(overrides, None),
            Err(Error::Config(_))
        ));

        let overrides = ConfigOverrides {
            airdrop_lamports: Some(10),
            transfer_lamports: Some(10),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            Config::resolve(overrides, None),
            Err(Error::Config(_))
        ));

        let overrides = ConfigOverrides {
            confirm_timeout_secs: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(Config::resolve(overrides, None).is_err());
    }
}
