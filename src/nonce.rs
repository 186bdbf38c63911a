//! Nonce account lifecycle: create, read, advance, authorize, withdraw.

use {
    crate::{error::Result, harness::Harness},
    log::*,
    solana_rpc_client::rpc_client::RpcClient,
    solana_rpc_client_nonce_utils::{data_from_account, get_account_with_commitment},
    solana_sdk::{
        commitment_config::CommitmentConfig,
        hash::Hash,
        nonce::State as NonceState,
        pubkey::Pubkey,
        signature::{Keypair, Signature, Signer},
        system_instruction,
    },
};

/// Address and expected authority of a nonce account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceAccount {
    pub address: Pubkey,
    pub authority: Pubkey,
}

/// Nonce account contents as last read from the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSnapshot {
    pub blockhash: Hash,
    pub authority: Pubkey,
    pub lamports_per_signature: u64,
}

pub fn minimum_nonce_balance(rpc_client: &RpcClient) -> Result<u64> {
    Ok(rpc_client.get_minimum_balance_for_rent_exemption(NonceState::size())?)
}

/// Creates and initializes a nonce account in one transaction. The system
/// program splits this into a create-account instruction followed by an
/// initialize-nonce instruction; both must land together.
pub fn create_nonce_account(
    harness: &Harness,
    nonce_keypair: &Keypair,
    authority: &Pubkey,
    lamports: Option<u64>,
) -> Result<NonceAccount> {
    let lamports = match lamports {
        Some(lamports) => lamports,
        None => minimum_nonce_balance(harness.rpc_client())?,
    };
    let payer = harness.payer();
    let instructions = system_instruction::create_nonce_account(
        &payer.pubkey(),
        &nonce_keypair.pubkey(),
        authority,
        lamports,
    );
    let signature = harness.send_and_confirm(&instructions, &[payer, nonce_keypair])?;
    info!(
        "created nonce account {} (authority {authority}, {lamports} lamports): {signature}",
        nonce_keypair.pubkey()
    );
    Ok(NonceAccount {
        address: nonce_keypair.pubkey(),
        authority: *authority,
    })
}

/// Reads a nonce account, failing if it is not an initialized system-owned
/// nonce account.
pub fn fetch_nonce(
    rpc_client: &RpcClient,
    address: &Pubkey,
    commitment: CommitmentConfig,
) -> Result<NonceSnapshot> {
    let account = get_account_with_commitment(rpc_client, address, commitment)?;
    let data = data_from_account(&account)?;
    Ok(NonceSnapshot {
        blockhash: data.blockhash(),
        authority: data.authority,
        lamports_per_signature: data.get_lamports_per_signature(),
    })
}

pub fn get_nonce(harness: &Harness, address: &Pubkey) -> Result<Hash> {
    Ok(fetch_nonce(harness.rpc_client(), address, harness.commitment())?.blockhash)
}

/// Advances the nonce with a standalone transaction.
pub fn advance_nonce(
    harness: &Harness,
    nonce_account: &NonceAccount,
    authority: &dyn Signer,
) -> Result<Signature> {
    let instruction =
        system_instruction::advance_nonce_account(&nonce_account.address, &authority.pubkey());
    let signature =
        harness.send_and_confirm(&[instruction], &[harness.payer() as &dyn Signer, authority])?;
    debug!("advanced nonce {}: {signature}", nonce_account.address);
    Ok(signature)
}

/// Hands the nonce account over to `new_authority`.
pub fn authorize_nonce(
    harness: &Harness,
    nonce_account: &mut NonceAccount,
    authority: &dyn Signer,
    new_authority: &Pubkey,
) -> Result<Signature> {
    let instruction = system_instruction::authorize_nonce_account(
        &nonce_account.address,
        &authority.pubkey(),
        new_authority,
    );
    let signature =
        harness.send_and_confirm(&[instruction], &[harness.payer() as &dyn Signer, authority])?;
    info!(
        "nonce {} authority {} -> {new_authority}: {signature}",
        nonce_account.address,
        authority.pubkey()
    );
    nonce_account.authority = *new_authority;
    Ok(signature)
}

pub fn withdraw_nonce(
    harness: &Harness,
    nonce_account: &NonceAccount,
    authority: &dyn Signer,
    to: &Pubkey,
    lamports: u64,
) -> Result<Signature> {
    let instruction = system_instruction::withdraw_nonce_account(
        &nonce_account.address,
        &authority.pubkey(),
        to,
        lamports,
    );
    let signature =
        harness.send_and_confirm(&[instruction], &[harness.payer() as &dyn Signer, authority])?;
    debug!(
        "withdrew {lamports} lamports from nonce {} to {to}: {signature}",
        nonce_account.address
    );
    Ok(signature)
}

/// Withdraws the whole balance back to the payer, which closes the account.
pub fn close_nonce_account(
    harness: &Harness,
    nonce_account: &NonceAccount,
    authority: &dyn Signer,
) -> Result<u64> {
    let lamports = harness.get_balance(&nonce_account.address)?;
    // Withdrawing from a nonce stored in the current blockhash is refused.
    harness.wait_for_fresh_blockhash()?;
    withdraw_nonce(
        harness,
        nonce_account,
        authority,
        &harness.payer().pubkey(),
        lamports,
    )?;
    harness.check_balance(0, &nonce_account.address)?;
    Ok(lamports)
}
