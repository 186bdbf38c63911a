use {
    crate::{
        config::{
            ConfigOverrides, ENV_AIRDROP_LAMPORTS, ENV_COMMITMENT, ENV_CONFIRM_TIMEOUT_SECS,
            ENV_FUNDING_KEYPAIR, ENV_RPC_URL, ENV_TRANSFER_LAMPORTS,
        },
        scenarios::Scenario,
    },
    clap::{crate_description, crate_name, values_t, App, Arg, ArgMatches},
    solana_clap_utils::{
        input_parsers::value_of,
        input_validators::{is_keypair, is_parsable, is_url_or_moniker},
    },
    solana_cli_config::CONFIG_FILE,
    std::{ffi::OsString, path::PathBuf},
};

pub struct Args {
    pub config_file: Option<String>,
    pub overrides: ConfigOverrides,
    pub scenarios: Vec<Scenario>,
}

fn get_matches<'a, I, T>(args: I) -> ArgMatches<'a>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    App::new(crate_name!())
        .about(crate_description!())
        .version(solana_version::version!())
        .arg(
            Arg::with_name("config_file")
                .short("C")
                .long("config")
                .takes_value(true)
                .value_name("FILEPATH")
                .help("Solana CLI config file [default: ~/.config/solana/cli/config.yml]"),
        )
        .arg(
            Arg::with_name("json_rpc_url")
                .short("u")
                .long("url")
                .value_name("URL_OR_MONIKER")
                .takes_value(true)
                .env(ENV_RPC_URL)
                .validator(is_url_or_moniker)
                .help(
                    "URL for Solana's JSON RPC or moniker (or their first letter): \
                       [mainnet-beta, testnet, devnet, localhost]",
                ),
        )
        .arg(
            Arg::with_name("commitment")
                .long("commitment")
                .takes_value(true)
                .value_name("COMMITMENT_LEVEL")
                .env(ENV_COMMITMENT)
                .possible_values(&["processed", "confirmed", "finalized"])
                .help("Commitment used for reads, preflight and confirmation [default: confirmed]"),
        )
        .arg(
            Arg::with_name("airdrop_lamports")
                .long("airdrop-lamports")
                .takes_value(true)
                .value_name("LAMPORTS")
                .env(ENV_AIRDROP_LAMPORTS)
                .validator(is_parsable::<u64>)
                .help("Lamports to fund the payer with [default: 1 SOL]"),
        )
        .arg(
            Arg::with_name("transfer_lamports")
                .long("transfer-lamports")
                .takes_value(true)
                .value_name("LAMPORTS")
                .env(ENV_TRANSFER_LAMPORTS)
                .validator(is_parsable::<u64>)
                .help(
                    "Lamports moved by each durable transfer; must cover rent exemption \
                     of a new account [default: 0.001 SOL]",
                ),
        )
        .arg(
            Arg::with_name("funding_keypair")
                .long("funding-keypair")
                .takes_value(true)
                .value_name("KEYPAIR")
                .env(ENV_FUNDING_KEYPAIR)
                .validator(is_keypair)
                .help("Fund the payer from this keypair file instead of requesting an airdrop"),
        )
        .arg(
            Arg::with_name("confirm_timeout")
                .long("confirm-timeout")
                .takes_value(true)
                .value_name("SECONDS")
                .env(ENV_CONFIRM_TIMEOUT_SECS)
                .validator(is_parsable::<u64>)
                .help("Seconds to wait for a submitted transaction to land [default: 60]"),
        )
        .arg(
            Arg::with_name("wait_for_blockhash_expiry")
                .long("wait-for-blockhash-expiry")
                .takes_value(false)
                .help(
                    "In the deferred scenario, wait until the blockhash current at signing \
                     time has expired before submitting",
                ),
        )
        .arg(
            Arg::with_name("scenario")
                .long("scenario")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .value_name("NAME")
                .validator(is_parsable::<Scenario>)
                .help(
                    "Scenario to run; may be repeated [default: all]. One of: advance, \
                     failed-instruction, missing-signature, stale-nonce, authorize, deferred",
                ),
        )
        .get_matches_from(args)
}

pub fn parse_args<I, T>(args: I) -> Args
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = get_matches(args);

    let scenarios = if matches.is_present("scenario") {
        values_t!(matches, "scenario", Scenario).unwrap_or_else(|e| e.exit())
    } else {
        Scenario::all().to_vec()
    };

    Args {
        config_file: matches
            .value_of("config_file")
            .map(|path| path.to_string())
            .or_else(|| CONFIG_FILE.clone()),
        overrides: ConfigOverrides {
            json_rpc_url: matches.value_of("json_rpc_url").map(|url| url.to_string()),
            commitment: matches.value_of("commitment").map(|level| level.to_string()),
            airdrop_lamports: value_of(&matches, "airdrop_lamports"),
            transfer_lamports: value_of(&matches, "transfer_lamports"),
            funding_keypair: matches.value_of("funding_keypair").map(PathBuf::from),
            confirm_timeout_secs: value_of(&matches, "confirm_timeout"),
            wait_for_blockhash_expiry: matches.is_present("wait_for_blockhash_expiry"),
        },
        scenarios,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let args = parse_args(vec!["solana-durable-nonce-e2e"]);
        assert_eq!(args.scenarios, Scenario::all().to_vec());
        assert!(!args.overrides.wait_for_blockhash_expiry);
        assert_eq!(args.overrides.transfer_lamports, None);
    }

    #[test]
    fn test_parse_overrides() {
        let args = parse_args(vec![
            "solana-durable-nonce-e2e",
            "--config",
            "/tmp/config.yml",
            "--url",
            "localhost",
            "--commitment",
            "finalized",
            "--airdrop-lamports",
            "5000000000",
            "--transfer-lamports",
            "2000000",
            "--confirm-timeout",
            "15",
            "--wait-for-blockhash-expiry",
            "--scenario",
            "stale-nonce",
            "--scenario",
            "advance",
        ]);
        assert_eq!(args.config_file.as_deref(), Some("/tmp/config.yml"));
        assert_eq!(args.overrides.json_rpc_url.as_deref(), Some("localhost"));
        assert_eq!(args.overrides.commitment.as_deref(), Some("finalized"));
        assert_eq!(args.overrides.airdrop_lamports, Some(5_000_000_000));
        assert_eq!(args.overrides.transfer_lamports, Some(2_000_000));
        assert_eq!(args.overrides.confirm_timeout_secs, Some(15));
        assert!(args.overrides.wait_for_blockhash_expiry);
        assert_eq!(args.scenarios, vec![Scenario::StaleNonce, Scenario::Advance]);
    }
}
