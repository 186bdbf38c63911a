//! The durable nonce checks.
//!
//! Every scenario gets its own nonce account, records the nonce value before
//! and after the transaction under test, and returns the lamports to the
//! payer when it is done. The property exercised throughout: the nonce
//! advances exactly when the advance instruction is included and properly
//! authorized, whatever happens to the instructions after it.

use {
    crate::{
        codec::{encode_transaction, TransportEncoding},
        durable::{check_durable, partial_sign, sign, DurableTransactionBuilder},
        ensure,
        error::{Error, Result},
        harness::Harness,
        nonce::{
            authorize_nonce, close_nonce_account, create_nonce_account, fetch_nonce, get_nonce,
            NonceAccount,
        },
        submit::{submit_encoded, Outcome, SubmitConfig},
    },
    log::*,
    solana_rpc_client_api::custom_error::JSON_RPC_SERVER_ERROR_TRANSACTION_SIGNATURE_VERIFICATION_FAILURE,
    solana_sdk::{
        hash::Hash,
        instruction::InstructionError,
        pubkey::Pubkey,
        signature::{Keypair, Signer},
        signer::SignerError,
        system_instruction,
        transaction::{Transaction, TransactionError},
    },
    std::{
        fmt,
        str::FromStr,
        time::{Duration, Instant},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Advance plus transfer, fully signed: lands and advances the nonce.
    Advance,
    /// Advance plus a transfer that cannot succeed: the transaction fails on
    /// chain yet the nonce still advances.
    FailedInstruction,
    /// The nonce authority never signs: refused, nonce untouched.
    MissingSignature,
    /// Two transactions signed against one nonce value: only the first lands.
    StaleNonce,
    /// Authority handed from A to B: A can no longer advance, B can, and B
    /// hands it back inside the same durable transaction.
    Authorize,
    /// Signed now, submitted after the cluster has moved on.
    Deferred,
}

impl Scenario {
    pub fn all() -> [Scenario; 6] {
        [
            Self::Advance,
            Self::FailedInstruction,
            Self::MissingSignature,
            Self::StaleNonce,
            Self::Authorize,
            Self::Deferred,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::FailedInstruction => "failed-instruction",
            Self::MissingSignature => "missing-signature",
            Self::StaleNonce => "stale-nonce",
            Self::Authorize => "authorize",
            Self::Deferred => "deferred",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| format!("unknown scenario: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub nonce_account: Pubkey,
    pub nonce_before: Hash,
    pub nonce_after: Hash,
    /// Outcome of the transaction the scenario is about.
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl ScenarioReport {
    pub fn nonce_advanced(&self) -> bool {
        self.nonce_before != self.nonce_after
    }
}

/// What a scenario body hands back; timing is filled in by `run_scenario`.
struct Run {
    nonce_account: Pubkey,
    nonce_before: Hash,
    nonce_after: Hash,
    outcome: Outcome,
}

pub fn run_scenario(harness: &Harness, scenario: Scenario) -> Result<ScenarioReport> {
    info!("scenario {scenario}: start");
    let start = Instant::now();
    let run = match scenario {
        Scenario::Advance => advance(harness)?,
        Scenario::FailedInstruction => failed_instruction(harness)?,
        Scenario::MissingSignature => missing_signature(harness)?,
        Scenario::StaleNonce => stale_nonce(harness)?,
        Scenario::Authorize => authorize(harness)?,
        Scenario::Deferred => deferred(harness)?,
    };
    let report = ScenarioReport {
        scenario,
        nonce_account: run.nonce_account,
        nonce_before: run.nonce_before,
        nonce_after: run.nonce_after,
        outcome: run.outcome,
        elapsed: start.elapsed(),
    };
    info!("scenario {scenario}: {} in {:?}", report.outcome, report.elapsed);
    Ok(report)
}

/// Runs `scenarios` in order, continuing past failures.
pub fn run_scenarios(
    harness: &Harness,
    scenarios: &[Scenario],
) -> Vec<(Scenario, Result<ScenarioReport>)> {
    scenarios
        .iter()
        .map(|scenario| {
            let result = run_scenario(harness, *scenario);
            if let Err(err) = &result {
                error!("scenario {scenario}: {err}");
            }
            (*scenario, result)
        })
        .collect()
}

fn submit_config(harness: &Harness) -> SubmitConfig {
    let config = harness.config();
    SubmitConfig::new(harness.commitment(), config.confirm_timeout, config.poll_interval)
}

/// Creates a rent-exempt nonce account under `authority` and waits until its
/// stored nonce may be advanced.
fn new_nonce_account(harness: &Harness, authority: &Pubkey) -> Result<(NonceAccount, Hash)> {
    let nonce_keypair = Keypair::new();
    let nonce_account = create_nonce_account(harness, &nonce_keypair, authority, None)?;
    let snapshot = fetch_nonce(
        harness.rpc_client(),
        &nonce_account.address,
        harness.commitment(),
    )?;
    ensure!(
        snapshot.authority == *authority,
        "new nonce account authority is {}, expected {authority}",
        snapshot.authority
    );
    harness.wait_for_fresh_blockhash()?;
    Ok((nonce_account, snapshot.blockhash))
}

fn ensure_advanced(before: &Hash, after: &Hash) -> Result<()> {
    ensure!(before != after, "nonce did not advance from {before}");
    Ok(())
}

fn ensure_unchanged(before: &Hash, after: &Hash) -> Result<()> {
    ensure!(before == after, "nonce moved from {before} to {after}");
    Ok(())
}

/// Fails unless `outcome` is a refusal carrying one of `expected`.
fn ensure_rejected_with(
    outcome: &Outcome,
    expected: &[TransactionError],
    what: &str,
) -> Result<()> {
    match outcome.transaction_error() {
        Some(error) if outcome.is_rejected() && expected.contains(error) => Ok(()),
        _ => Err(Error::Expectation(format!(
            "{what} should have been rejected with one of {expected:?}, got {outcome}"
        ))),
    }
}

fn encode_and_submit(
    harness: &Harness,
    transaction: &Transaction,
    encoding: TransportEncoding,
    config: &SubmitConfig,
) -> Result<Outcome> {
    let encoded = encode_transaction(transaction, encoding)?;
    submit_encoded(harness.rpc_client(), &encoded, encoding, config)
}

fn advance(harness: &Harness) -> Result<Run> {
    let payer = harness.payer();
    let (nonce_account, nonce_before) = new_nonce_account(harness, &payer.pubkey())?;
    let recipient = Pubkey::new_unique();
    let lamports = harness.config().transfer_lamports;

    let mut transaction = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
        .instruction(system_instruction::transfer(&payer.pubkey(), &recipient, lamports))
        .build(nonce_before);
    sign(&mut transaction, &[payer], nonce_before)?;
    check_durable(&transaction, &nonce_account.address, &nonce_before)?;
    let encoded = encode_transaction(&transaction, TransportEncoding::Base64)?;
    debug!("encoded durable transaction: {encoded}");

    let outcome = submit_encoded(
        harness.rpc_client(),
        &encoded,
        TransportEncoding::Base64,
        &submit_config(harness),
    )?;
    ensure!(outcome.is_confirmed(), "durable transfer was not confirmed: {outcome}");

    let nonce_after = get_nonce(harness, &nonce_account.address)?;
    ensure_advanced(&nonce_before, &nonce_after)?;
    harness.check_balance(lamports, &recipient)?;

    close_nonce_account(harness, &nonce_account, payer)?;
    Ok(Run {
        nonce_account: nonce_account.address,
        nonce_before,
        nonce_after,
        outcome,
    })
}

fn failed_instruction(harness: &Harness) -> Result<Run> {
    let payer = harness.payer();
    let (nonce_account, nonce_before) = new_nonce_account(harness, &payer.pubkey())?;
    let recipient = Pubkey::new_unique();
    // More than the payer holds, so the transfer is guaranteed to fail.
    let lamports = harness.get_balance(&payer.pubkey())?.saturating_add(1);

    let mut transaction = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
        .instruction(system_instruction::transfer(&payer.pubkey(), &recipient, lamports))
        .build(nonce_before);
    sign(&mut transaction, &[payer], nonce_before)?;
    let encoded = encode_transaction(&transaction, TransportEncoding::Base58)?;

    // Preflight would refuse the transaction before it reached the ledger.
    let config = submit_config(harness).skip_preflight();
    let outcome = submit_encoded(
        harness.rpc_client(),
        &encoded,
        TransportEncoding::Base58,
        &config,
    )?;
    match &outcome {
        Outcome::Failed {
            error: TransactionError::InstructionError(1, _),
            ..
        } => {}
        _ => {
            return Err(Error::Expectation(format!(
                "expected the transfer instruction to fail on chain, got {outcome}"
            )))
        }
    }

    let nonce_after = get_nonce(harness, &nonce_account.address)?;
    ensure_advanced(&nonce_before, &nonce_after)?;
    harness.check_balance(0, &recipient)?;

    close_nonce_account(harness, &nonce_account, payer)?;
    Ok(Run {
        nonce_account: nonce_account.address,
        nonce_before,
        nonce_after,
        outcome,
    })
}

fn missing_signature(harness: &Harness) -> Result<Run> {
    let payer = harness.payer();
    let authority = Keypair::new();
    let (nonce_account, nonce_before) = new_nonce_account(harness, &authority.pubkey())?;
    let recipient = Pubkey::new_unique();
    let lamports = harness.config().transfer_lamports;

    let builder = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
        .instruction(system_instruction::transfer(&payer.pubkey(), &recipient, lamports));

    let mut transaction = builder.build(nonce_before);
    match sign(&mut transaction, &[payer], nonce_before) {
        Err(Error::Signer(SignerError::NotEnoughSigners)) => {}
        other => {
            return Err(Error::Expectation(format!(
                "signing without the nonce authority should report missing signers, got {other:?}"
            )))
        }
    }

    let mut transaction = builder.build(nonce_before);
    partial_sign(&mut transaction, &[payer], nonce_before)?;
    ensure!(!transaction.is_signed(), "transaction unexpectedly fully signed");
    let encoded = encode_transaction(&transaction, TransportEncoding::Base64)?;

    let outcome = submit_encoded(
        harness.rpc_client(),
        &encoded,
        TransportEncoding::Base64,
        &submit_config(harness),
    )?;
    ensure!(
        outcome.rejection_code()
            == Some(JSON_RPC_SERVER_ERROR_TRANSACTION_SIGNATURE_VERIFICATION_FAILURE),
        "transaction without the authority signature should fail signature \
         verification, got {outcome}"
    );

    let nonce_after = get_nonce(harness, &nonce_account.address)?;
    ensure_unchanged(&nonce_before, &nonce_after)?;
    harness.check_balance(0, &recipient)?;

    close_nonce_account(harness, &nonce_account, &authority)?;
    Ok(Run {
        nonce_account: nonce_account.address,
        nonce_before,
        nonce_after,
        outcome,
    })
}

fn stale_nonce(harness: &Harness) -> Result<Run> {
    let payer = harness.payer();
    let (nonce_account, nonce_before) = new_nonce_account(harness, &payer.pubkey())?;
    let lamports = harness.config().transfer_lamports;
    let first_recipient = Pubkey::new_unique();
    let second_recipient = Pubkey::new_unique();
    let config = submit_config(harness);

    let signed_transfer = |recipient: &Pubkey| -> Result<_> {
        let mut transaction = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
            .instruction(system_instruction::transfer(&payer.pubkey(), recipient, lamports))
            .build(nonce_before);
        sign(&mut transaction, &[payer], nonce_before)?;
        Ok(transaction)
    };
    let first = signed_transfer(&first_recipient)?;
    let second = signed_transfer(&second_recipient)?;

    let first_outcome = encode_and_submit(harness, &first, TransportEncoding::Base64, &config)?;
    ensure!(
        first_outcome.is_confirmed(),
        "first transaction on a fresh nonce was not confirmed: {first_outcome}"
    );
    let nonce_after = get_nonce(harness, &nonce_account.address)?;
    ensure_advanced(&nonce_before, &nonce_after)?;

    let outcome = encode_and_submit(harness, &second, TransportEncoding::Base64, &config)?;
    ensure_rejected_with(
        &outcome,
        &[TransactionError::BlockhashNotFound],
        "transaction signed against a consumed nonce",
    )?;
    let replay = encode_and_submit(harness, &first, TransportEncoding::Base58, &config)?;
    ensure_rejected_with(
        &replay,
        &[
            TransactionError::BlockhashNotFound,
            TransactionError::AlreadyProcessed,
        ],
        "replay of a landed durable transaction",
    )?;

    ensure_unchanged(&nonce_after, &get_nonce(harness, &nonce_account.address)?)?;
    harness.check_balance(lamports, &first_recipient)?;
    harness.check_balance(0, &second_recipient)?;

    close_nonce_account(harness, &nonce_account, payer)?;
    Ok(Run {
        nonce_account: nonce_account.address,
        nonce_before,
        nonce_after,
        outcome,
    })
}

fn authorize(harness: &Harness) -> Result<Run> {
    let payer = harness.payer();
    let original_authority = Keypair::new();
    let new_authority = Keypair::new();
    let (mut nonce_account, nonce_before) =
        new_nonce_account(harness, &original_authority.pubkey())?;
    let config = submit_config(harness);

    authorize_nonce(
        harness,
        &mut nonce_account,
        &original_authority,
        &new_authority.pubkey(),
    )?;
    let snapshot = fetch_nonce(
        harness.rpc_client(),
        &nonce_account.address,
        harness.commitment(),
    )?;
    ensure!(
        snapshot.authority == new_authority.pubkey(),
        "nonce authority is {}, expected {}",
        snapshot.authority,
        new_authority.pubkey()
    );
    ensure_unchanged(&nonce_before, &snapshot.blockhash)?;

    // The former authority signs an advance it no longer controls.
    let mut transaction = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
        .advance_authority(original_authority.pubkey())
        .build(nonce_before);
    sign(&mut transaction, &[payer, &original_authority], nonce_before)?;
    let outcome = encode_and_submit(harness, &transaction, TransportEncoding::Base64, &config)?;
    // A nonce is not honored unless its stored authority signed the advance.
    ensure_rejected_with(
        &outcome,
        &[
            TransactionError::BlockhashNotFound,
            TransactionError::InstructionError(0, InstructionError::MissingRequiredSignature),
        ],
        "advance signed by the former authority",
    )?;
    ensure_unchanged(&nonce_before, &get_nonce(harness, &nonce_account.address)?)?;

    // The new authority advances and hands the account back in one go.
    let mut transaction = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
        .instruction(system_instruction::authorize_nonce_account(
            &nonce_account.address,
            &new_authority.pubkey(),
            &original_authority.pubkey(),
        ))
        .build(nonce_before);
    sign(&mut transaction, &[payer, &new_authority], nonce_before)?;
    let outcome = encode_and_submit(harness, &transaction, TransportEncoding::Base64, &config)?;
    ensure!(
        outcome.is_confirmed(),
        "advance signed by the new authority was not confirmed: {outcome}"
    );
    nonce_account.authority = original_authority.pubkey();

    let snapshot = fetch_nonce(
        harness.rpc_client(),
        &nonce_account.address,
        harness.commitment(),
    )?;
    ensure_advanced(&nonce_before, &snapshot.blockhash)?;
    ensure!(
        snapshot.authority == original_authority.pubkey(),
        "nonce authority is {}, expected {} after handing it back",
        snapshot.authority,
        original_authority.pubkey()
    );

    close_nonce_account(harness, &nonce_account, &original_authority)?;
    Ok(Run {
        nonce_account: nonce_account.address,
        nonce_before,
        nonce_after: snapshot.blockhash,
        outcome,
    })
}

fn deferred(harness: &Harness) -> Result<Run> {
    let payer = harness.payer();
    let (nonce_account, nonce_before) = new_nonce_account(harness, &payer.pubkey())?;
    let recipient = Pubkey::new_unique();
    let lamports = harness.config().transfer_lamports;

    let signing_blockhash = harness.latest_blockhash()?;
    let mut transaction = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
        .instruction(system_instruction::transfer(&payer.pubkey(), &recipient, lamports))
        .build(nonce_before);
    sign(&mut transaction, &[payer], nonce_before)?;
    let encoded = encode_transaction(&transaction, TransportEncoding::Base64)?;
    drop(transaction);

    if harness.config().wait_for_blockhash_expiry {
        harness.wait_for_blockhash_expiry(&signing_blockhash)?;
    } else {
        harness.wait_for_fresh_blockhash()?;
    }

    let outcome = submit_encoded(
        harness.rpc_client(),
        &encoded,
        TransportEncoding::Base64,
        &submit_config(harness),
    )?;
    ensure!(
        outcome.is_confirmed(),
        "deferred durable transaction was not confirmed: {outcome}"
    );

    let nonce_after = get_nonce(harness, &nonce_account.address)?;
    ensure_advanced(&nonce_before, &nonce_after)?;
    harness.check_balance(lamports, &recipient)?;

    close_nonce_account(harness, &nonce_account, payer)?;
    Ok(Run {
        nonce_account: nonce_account.address,
        nonce_before,
        nonce_after,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use {super::*, solana_sdk::signature::Signature};

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in Scenario::all() {
            assert_eq!(scenario.name().parse::<Scenario>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
        assert!("advance-twice".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_scenarios_run_in_declared_order() {
        let names: Vec<_> = Scenario::all().iter().map(Scenario::name).collect();
        assert_eq!(
            names,
            [
                "advance",
                "failed-instruction",
                "missing-signature",
                "stale-nonce",
                "authorize",
                "deferred"
            ]
        );
    }

    #[test]
    fn test_ensure_rejected_with() {
        let stale = Outcome::Rejected {
            error: Some(TransactionError::BlockhashNotFound),
            code: Some(-32002),
            message: String::new(),
        };
        ensure_rejected_with(&stale, &[TransactionError::BlockhashNotFound], "stale").unwrap();
        assert!(matches!(
            ensure_rejected_with(&stale, &[TransactionError::AlreadyProcessed], "stale"),
            Err(Error::Expectation(_))
        ));

        let unexplained = Outcome::Rejected {
            error: None,
            code: Some(-32005),
            message: "Node is unhealthy".to_string(),
        };
        assert!(ensure_rejected_with(
            &unexplained,
            &[TransactionError::BlockhashNotFound],
            "stale"
        )
        .is_err());

        let failed = Outcome::Failed {
            signature: Signature::new_unique(),
            error: TransactionError::BlockhashNotFound,
        };
        assert!(
            ensure_rejected_with(&failed, &[TransactionError::BlockhashNotFound], "stale").is_err()
        );
    }

    #[test]
    fn test_report_nonce_advanced() {
        let nonce = Hash::new_unique();
        let mut report = ScenarioReport {
            scenario: Scenario::MissingSignature,
            nonce_account: Pubkey::new_unique(),
            nonce_before: nonce,
            nonce_after: nonce,
            outcome: Outcome::Rejected {
                error: None,
                code: Some(JSON_RPC_SERVER_ERROR_TRANSACTION_SIGNATURE_VERIFICATION_FAILURE),
                message: String::new(),
            },
            elapsed: Duration::ZERO,
        };
        assert!(!report.nonce_advanced());

        report.scenario = Scenario::Advance;
        report.nonce_after = Hash::new_unique();
        report.outcome = Outcome::Confirmed(Signature::new_unique());
        assert!(report.nonce_advanced());
    }
}
