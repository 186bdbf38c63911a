//! Cluster-facing setup shared by every scenario: an RPC client, a funded
//! payer, and the waits needed to line transactions up with the ledger.

use {
    crate::{
        config::Config,
        error::{Error, Result},
    },
    log::*,
    solana_rpc_client::rpc_client::RpcClient,
    solana_sdk::{
        commitment_config::CommitmentConfig,
        hash::Hash,
        instruction::Instruction,
        message::Message,
        native_token::lamports_to_sol,
        pubkey::Pubkey,
        signature::{read_keypair_file, Keypair, Signature, Signer},
        signer::signers::Signers,
        system_instruction,
        transaction::Transaction,
    },
    std::{
        thread::sleep,
        time::{Duration, Instant},
    },
};

const BALANCE_CHECK_RETRIES: usize = 5;
const BLOCKHASH_EXPIRY_TIMEOUT: Duration = Duration::from_secs(180);

pub struct Harness {
    rpc_client: RpcClient,
    config: Config,
    payer: Keypair,
    funder: Option<Keypair>,
}

impl Harness {
    /// Connects to the configured cluster and funds a fresh payer.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let rpc_client =
            RpcClient::new_with_commitment(config.json_rpc_url.clone(), config.commitment);
        let funder = config
            .funding_keypair
            .as_ref()
            .map(|path| {
                read_keypair_file(path).map_err(|err| {
                    Error::Config(format!(
                        "unable to read funding keypair {}: {err}",
                        path.display()
                    ))
                })
            })
            .transpose()?;

        let rent_exempt_minimum = rpc_client.get_minimum_balance_for_rent_exemption(0)?;
        if config.transfer_lamports < rent_exempt_minimum {
            return Err(Error::Config(format!(
                "transfer of {} lamports is below the rent-exempt minimum of {rent_exempt_minimum} \
                 lamports for a new account",
                config.transfer_lamports
            )));
        }

        let harness = Self {
            rpc_client,
            config,
            payer: Keypair::new(),
            funder,
        };
        info!(
            "payer {} on {}",
            harness.payer.pubkey(),
            harness.config.json_rpc_url
        );
        harness.fund(&harness.payer.pubkey(), harness.config.airdrop_lamports)?;
        harness.check_balance(harness.config.airdrop_lamports, &harness.payer.pubkey())?;
        Ok(harness)
    }

    pub fn rpc_client(&self) -> &RpcClient {
        &self.rpc_client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.config.commitment
    }

    pub fn payer(&self) -> &Keypair {
        &self.payer
    }

    /// Moves `lamports` to `pubkey`, from the funding keypair when one is
    /// configured and through the faucet otherwise.
    pub fn fund(&self, pubkey: &Pubkey, lamports: u64) -> Result<Signature> {
        match &self.funder {
            Some(funder) => {
                info!(
                    "funding {pubkey} with {} SOL from {}",
                    lamports_to_sol(lamports),
                    funder.pubkey()
                );
                self.send_and_confirm(
                    &[system_instruction::transfer(&funder.pubkey(), pubkey, lamports)],
                    &[funder],
                )
            }
            None => self.request_and_confirm_airdrop(pubkey, lamports),
        }
    }

    pub fn request_and_confirm_airdrop(
        &self,
        pubkey: &Pubkey,
        lamports: u64,
    ) -> Result<Signature> {
        info!("airdrop {} SOL to {pubkey}", lamports_to_sol(lamports));
        let recent_blockhash = self.rpc_client.get_latest_blockhash()?;
        let signature = self
            .rpc_client
            .request_airdrop_with_blockhash(pubkey, lamports, &recent_blockhash)?;
        self.rpc_client.confirm_transaction_with_spinner(
            &signature,
            &recent_blockhash,
            self.commitment(),
        )?;
        debug!("airdrop signature {signature}");
        Ok(signature)
    }

    pub fn new_funded_keypair(&self, lamports: u64) -> Result<Keypair> {
        let keypair = Keypair::new();
        self.fund(&keypair.pubkey(), lamports)?;
        Ok(keypair)
    }

    pub fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        Ok(self
            .rpc_client
            .get_balance_with_commitment(pubkey, self.commitment())?
            .value)
    }

    /// Waits for `pubkey` to hold exactly `expected` lamports.
    pub fn check_balance(&self, expected: u64, pubkey: &Pubkey) -> Result<()> {
        let mut balance = 0;
        for tries in 0..BALANCE_CHECK_RETRIES {
            balance = self.get_balance(pubkey)?;
            if balance == expected {
                return Ok(());
            }
            if tries + 1 < BALANCE_CHECK_RETRIES {
                warn!("balance of {pubkey} is {balance}, expected {expected}; retrying");
                sleep(self.config.poll_interval);
            }
        }
        Err(Error::Expectation(format!(
            "balance of {pubkey} is {balance}, expected {expected}"
        )))
    }

    pub fn latest_blockhash(&self) -> Result<Hash> {
        Ok(self
            .rpc_client
            .get_latest_blockhash_with_commitment(self.commitment())?
            .0)
    }

    /// Returns a blockhash newer than the current one.
    ///
    /// A nonce that was stored while `B` was the latest blockhash cannot be
    /// advanced again until the cluster has moved past `B`.
    pub fn wait_for_fresh_blockhash(&self) -> Result<Hash> {
        let current = self.latest_blockhash()?;
        let deadline = Instant::now() + self.config.confirm_timeout;
        loop {
            let blockhash = self.latest_blockhash()?;
            if blockhash != current {
                debug!("new blockhash {blockhash}");
                return Ok(blockhash);
            }
            if Instant::now() > deadline {
                return Err(Error::Expectation(format!(
                    "blockhash stuck at {current} for {:?}",
                    self.config.confirm_timeout
                )));
            }
            sleep(self.config.poll_interval);
        }
    }

    /// Polls until the cluster stops accepting `blockhash` as recent.
    pub fn wait_for_blockhash_expiry(&self, blockhash: &Hash) -> Result<()> {
        info!("waiting for blockhash {blockhash} to expire");
        let deadline = Instant::now() + BLOCKHASH_EXPIRY_TIMEOUT;
        while self
            .rpc_client
            .is_blockhash_valid(blockhash, self.commitment())?
        {
            if Instant::now() > deadline {
                return Err(Error::Expectation(format!(
                    "blockhash {blockhash} still valid after {BLOCKHASH_EXPIRY_TIMEOUT:?}"
                )));
            }
            sleep(self.config.poll_interval * 4);
        }
        Ok(())
    }

    /// Sends an ordinary transaction, paid for by the harness payer unless
    /// the payer is absent from `signers`, in which case the first signer pays.
    pub fn send_and_confirm<T: Signers + ?Sized>(
        &self,
        instructions: &[Instruction],
        signers: &T,
    ) -> Result<Signature> {
        let signer_pubkeys = signers.pubkeys();
        let payer = if signer_pubkeys.contains(&self.payer.pubkey()) {
            self.payer.pubkey()
        } else {
            *signer_pubkeys
                .first()
                .ok_or_else(|| Error::Config("transaction has no signers".to_string()))?
        };
        let message = Message::new(instructions, Some(&payer));
        let mut transaction = Transaction::new_unsigned(message);
        let blockhash = self.rpc_client.get_latest_blockhash()?;
        transaction.try_sign(signers, blockhash)?;
        let signature = self
            .rpc_client
            .send_and_confirm_transaction(&transaction)?;
        debug!("confirmed {signature}");
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::path::PathBuf};

    #[test]
    fn test_new_rejects_unreadable_funding_keypair() {
        let config = Config {
            funding_keypair: Some(PathBuf::from("/nonexistent/funder.json")),
            ..Config::default()
        };
        assert!(matches!(Harness::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            transfer_lamports: 0,
            ..Config::default()
        };
        assert!(matches!(Harness::new(config), Err(Error::Config(_))));
    }
}
