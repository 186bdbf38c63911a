//! Assembly and signing of durable transactions.
//!
//! A durable transaction carries a nonce value in place of its recent
//! blockhash and starts with the system program's `AdvanceNonceAccount`
//! instruction. The runtime only honors the nonce when both hold.

use {
    crate::{
        error::{Error, Result},
        nonce::NonceAccount,
    },
    solana_sdk::{
        hash::Hash,
        instruction::Instruction,
        message::Message,
        program_utils::limited_deserialize,
        pubkey::Pubkey,
        signer::signers::Signers,
        system_instruction::SystemInstruction,
        system_program,
        transaction::Transaction,
    },
};

#[derive(Debug, Clone)]
pub struct DurableTransactionBuilder {
    payer: Pubkey,
    nonce_account: Pubkey,
    nonce_authority: Pubkey,
    instructions: Vec<Instruction>,
}

impl DurableTransactionBuilder {
    pub fn new(payer: Pubkey, nonce_account: &NonceAccount) -> Self {
        Self {
            payer,
            nonce_account: nonce_account.address,
            nonce_authority: nonce_account.authority,
            instructions: vec![],
        }
    }

    /// Names a different key as the signer of the advance instruction. The
    /// cluster rejects the advance unless this matches the stored authority.
    pub fn advance_authority(mut self, authority: Pubkey) -> Self {
        self.nonce_authority = authority;
        self
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn instructions<I: IntoIterator<Item = Instruction>>(mut self, instructions: I) -> Self {
        self.instructions.extend(instructions);
        self
    }

    pub fn message(&self, nonce: Hash) -> Message {
        let mut message = Message::new_with_nonce(
            self.instructions.clone(),
            Some(&self.payer),
            &self.nonce_account,
            &self.nonce_authority,
        );
        message.recent_blockhash = nonce;
        message
    }

    /// Builds the unsigned transaction with the advance instruction first and
    /// `nonce` as its recent blockhash.
    pub fn build(&self, nonce: Hash) -> Transaction {
        Transaction::new_unsigned(self.message(nonce))
    }
}

/// Signs with every required key; fails with `NotEnoughSigners` when one is
/// missing.
pub fn sign<T: Signers + ?Sized>(
    transaction: &mut Transaction,
    signers: &T,
    nonce: Hash,
) -> Result<()> {
    transaction.try_sign(signers, nonce)?;
    Ok(())
}

/// Signs with whatever keys are provided, leaving the remaining signature
/// slots as defaults.
pub fn partial_sign<T: Signers + ?Sized>(
    transaction: &mut Transaction,
    signers: &T,
    nonce: Hash,
) -> Result<()> {
    transaction.try_partial_sign(signers, nonce)?;
    Ok(())
}

/// Returns the nonce account advanced by the first instruction, if that
/// instruction is a system `AdvanceNonceAccount`.
pub fn durable_nonce_account(transaction: &Transaction) -> Option<Pubkey> {
    let message = &transaction.message;
    let first_instruction = message.instructions.first()?;
    let program_id = message
        .account_keys
        .get(first_instruction.program_id_index as usize)?;
    if !system_program::check_id(program_id) {
        return None;
    }
    match limited_deserialize(&first_instruction.data).ok()? {
        SystemInstruction::AdvanceNonceAccount => first_instruction
            .accounts
            .first()
            .and_then(|index| message.account_keys.get(*index as usize))
            .copied(),
        _ => None,
    }
}

/// Fails unless `transaction` advances `nonce_account` first and carries
/// `nonce` as its recent blockhash.
pub fn check_durable(
    transaction: &Transaction,
    nonce_account: &Pubkey,
    nonce: &Hash,
) -> Result<()> {
    match durable_nonce_account(transaction) {
        Some(address)
            if address == *nonce_account && transaction.message.recent_blockhash == *nonce =>
        {
            Ok(())
        }
        _ => Err(Error::NotDurable(*nonce_account)),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        solana_sdk::{
            signature::{Keypair, Signature, Signer},
            signer::SignerError,
            system_instruction, system_transaction,
        },
    };

    fn nonce_account(authority: Pubkey) -> NonceAccount {
        NonceAccount {
            address: Pubkey::new_unique(),
            authority,
        }
    }

    #[test]
    fn test_advance_instruction_comes_first() {
        let payer = Keypair::new();
        let nonce_account = nonce_account(payer.pubkey());
        let nonce = Hash::new_unique();
        let recipient = Pubkey::new_unique();

        let tx = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
            .instruction(system_instruction::transfer(&payer.pubkey(), &recipient, 1))
            .build(nonce);

        assert_eq!(tx.message.instructions.len(), 2);
        assert_eq!(tx.message.recent_blockhash, nonce);
        assert_eq!(tx.message.account_keys[0], payer.pubkey());
        assert_eq!(durable_nonce_account(&tx), Some(nonce_account.address));
        check_durable(&tx, &nonce_account.address, &nonce).unwrap();
        assert!(matches!(
            check_durable(&tx, &nonce_account.address, &Hash::new_unique()),
            Err(Error::NotDurable(_))
        ));
        assert!(check_durable(&tx, &Pubkey::new_unique(), &nonce).is_err());
    }

    #[test]
    fn test_plain_transaction_is_not_durable() {
        let from = Keypair::new();
        let blockhash = Hash::new_unique();
        let tx = system_transaction::transfer(&from, &Pubkey::new_unique(), 1, blockhash);
        assert_eq!(durable_nonce_account(&tx), None);
        assert!(check_durable(&tx, &Pubkey::new_unique(), &blockhash).is_err());
        assert_eq!(durable_nonce_account(&Transaction::default()), None);
    }

    #[test]
    fn test_separate_authority_must_sign() {
        let payer = Keypair::new();
        let authority = Keypair::new();
        let nonce_account = nonce_account(authority.pubkey());
        let nonce = Hash::new_unique();

        let builder = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account).instruction(
            system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1),
        );

        let mut tx = builder.build(nonce);
        assert_eq!(tx.message.header.num_required_signatures, 2);
        let err = sign(&mut tx, &[&payer], nonce).unwrap_err();
        assert!(matches!(err, Error::Signer(SignerError::NotEnoughSigners)));

        let mut tx = builder.build(nonce);
        partial_sign(&mut tx, &[&payer], nonce).unwrap();
        assert!(!tx.is_signed());
        assert_ne!(tx.signatures[0], Signature::default());
        assert_eq!(tx.signatures[1], Signature::default());
        assert!(tx.verify().is_err());

        let mut tx = builder.build(nonce);
        sign(&mut tx, &[&payer, &authority], nonce).unwrap();
        assert!(tx.is_signed());
        assert!(tx.verify().is_ok());
    }

    #[test]
    fn test_instructions_follow_the_advance_in_order() {
        let payer = Keypair::new();
        let nonce_account = nonce_account(payer.pubkey());
        let first = Pubkey::new_unique();
        let second = Pubkey::new_unique();

        let tx = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
            .instructions(vec![
                system_instruction::transfer(&payer.pubkey(), &first, 1),
                system_instruction::transfer(&payer.pubkey(), &second, 2),
            ])
            .build(Hash::new_unique());

        let message = &tx.message;
        assert_eq!(message.instructions.len(), 3);
        assert_eq!(durable_nonce_account(&tx), Some(nonce_account.address));
        let recipient_of = |index: usize| {
            let instruction = &message.instructions[index];
            message.account_keys[instruction.accounts[1] as usize]
        };
        assert_eq!(recipient_of(1), first);
        assert_eq!(recipient_of(2), second);
    }

    #[test]
    fn test_advance_authority_override() {
        let payer = Keypair::new();
        let stored_authority = Pubkey::new_unique();
        let other_authority = Keypair::new();
        let nonce_account = nonce_account(stored_authority);

        let tx = DurableTransactionBuilder::new(payer.pubkey(), &nonce_account)
            .advance_authority(other_authority.pubkey())
            .build(Hash::new_unique());

        assert!(tx.message.account_keys.contains(&other_authority.pubkey()));
        assert!(!tx.message.account_keys.contains(&stored_authority));
        assert_eq!(durable_nonce_account(&tx), Some(nonce_account.address));
    }
}
