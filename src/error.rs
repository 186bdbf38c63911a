use {
    solana_rpc_client_api::client_error::Error as ClientError,
    solana_rpc_client_nonce_utils::Error as NonceError,
    solana_sdk::{pubkey::Pubkey, signer::SignerError},
    std::{io, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("rpc client error: {0}")]
    Client(#[from] Box<ClientError>),

    #[error("nonce account error: {0}")]
    Nonce(#[from] NonceError),

    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("base58 decode error: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("encoded transaction too large: {len} characters, max {max}")]
    EncodedTooLarge { len: usize, max: usize },

    #[error("serialized transaction too large: {len} bytes, max {max}")]
    SerializedTooLarge { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transaction does not use durable nonce account {0}")]
    NotDurable(Pubkey),

    #[error("transaction {signature} not confirmed after {timeout:?}")]
    ConfirmationTimeout { signature: String, timeout: Duration },

    #[error("expectation failed: {0}")]
    Expectation(String),
}

impl From<ClientError> for Error {
    fn from(err: ClientError) -> Self {
        Self::Client(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns `Error::Expectation` built from the format arguments when the
/// condition does not hold.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::Error::Expectation(format!($($arg)+)));
        }
    };
}
