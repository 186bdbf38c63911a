//! Submission of signed transactions and classification of what happened.

use {
    crate::{
        codec::{decode_transaction, TransportEncoding},
        error::{Error, Result},
    },
    log::*,
    solana_rpc_client::rpc_client::RpcClient,
    solana_rpc_client_api::{
        client_error::{Error as ClientError, ErrorKind as ClientErrorKind},
        config::RpcSendTransactionConfig,
        request::RpcError,
    },
    solana_sdk::{
        commitment_config::CommitmentConfig,
        signature::Signature,
        transaction::{Transaction, TransactionError},
    },
    std::{
        fmt,
        thread::sleep,
        time::{Duration, Instant},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitConfig {
    /// Skip the RPC node's simulation so that transactions which will fail
    /// during execution still reach the ledger.
    pub skip_preflight: bool,
    pub commitment: CommitmentConfig,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl SubmitConfig {
    pub fn new(commitment: CommitmentConfig, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            skip_preflight: false,
            commitment,
            timeout,
            poll_interval,
        }
    }

    pub fn skip_preflight(self) -> Self {
        Self {
            skip_preflight: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Landed and every instruction succeeded.
    Confirmed(Signature),
    /// Landed, fee was charged, but an instruction failed.
    Failed {
        signature: Signature,
        error: TransactionError,
    },
    /// Refused by the RPC node; never reached the ledger. `code` is the
    /// JSON-RPC error code when the node answered with one.
    Rejected {
        error: Option<TransactionError>,
        code: Option<i64>,
        message: String,
    },
}

impl Outcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// True when the transaction made it onto the ledger, successful or not.
    pub fn landed(&self) -> bool {
        !self.is_rejected()
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::Confirmed(signature) | Self::Failed { signature, .. } => Some(signature),
            Self::Rejected { .. } => None,
        }
    }

    pub fn transaction_error(&self) -> Option<&TransactionError> {
        match self {
            Self::Confirmed(_) => None,
            Self::Failed { error, .. } => Some(error),
            Self::Rejected { error, .. } => error.as_ref(),
        }
    }

    pub fn rejection_code(&self) -> Option<i64> {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => None,
        }
    }

    /// Classifies a send error. Only answers from the node count as a
    /// refusal; transport trouble yields `None`.
    fn refusal(err: &ClientError) -> Option<Self> {
        let code = match &err.kind {
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. }) => Some(*code),
            ClientErrorKind::TransactionError(_) => None,
            _ => return None,
        };
        Some(Self::Rejected {
            error: err.get_transaction_error(),
            code,
            message: err.to_string(),
        })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Confirmed(signature) => write!(f, "confirmed {signature}"),
            Self::Failed { signature, error } => write!(f, "failed {signature}: {error}"),
            Self::Rejected {
                error: Some(error), ..
            } => write!(f, "rejected: {error}"),
            Self::Rejected { message, .. } => write!(f, "rejected: {message}"),
        }
    }
}

/// Sends `transaction` and waits for it to land.
///
/// A refusal by the node at send time is an `Outcome`, not an error: several
/// scenarios expect it. Transport failures, at send time or while polling,
/// and running out of time are reported as `Err`.
pub fn submit(
    rpc_client: &RpcClient,
    transaction: &Transaction,
    config: &SubmitConfig,
) -> Result<Outcome> {
    let send_config = RpcSendTransactionConfig {
        skip_preflight: config.skip_preflight,
        preflight_commitment: Some(config.commitment.commitment),
        ..RpcSendTransactionConfig::default()
    };
    let signature = match rpc_client.send_transaction_with_config(transaction, send_config) {
        Ok(signature) => signature,
        Err(err) => {
            return match Outcome::refusal(&err) {
                Some(outcome) => {
                    debug!("send refused: {err}");
                    Ok(outcome)
                }
                None => Err(err.into()),
            }
        }
    };
    debug!("sent {signature}");
    wait_for_status(rpc_client, &signature, config)
}

/// Decodes a transaction previously produced by `encode_transaction` and
/// submits it.
pub fn submit_encoded(
    rpc_client: &RpcClient,
    encoded: &str,
    encoding: TransportEncoding,
    config: &SubmitConfig,
) -> Result<Outcome> {
    let transaction = decode_transaction(encoded, encoding)?;
    submit(rpc_client, &transaction, config)
}

fn wait_for_status(
    rpc_client: &RpcClient,
    signature: &Signature,
    config: &SubmitConfig,
) -> Result<Outcome> {
    let start = Instant::now();
    loop {
        if let Some(status) =
            rpc_client.get_signature_status_with_commitment(signature, config.commitment)?
        {
            return Ok(match status {
                Ok(()) => Outcome::Confirmed(*signature),
                Err(error) => Outcome::Failed {
                    signature: *signature,
                    error,
                },
            });
        }
        if start.elapsed() > config.timeout {
            return Err(Error::ConfirmationTimeout {
                signature: signature.to_string(),
                timeout: config.timeout,
            });
        }
        sleep(config.poll_interval);
    }
}
