//! Transport encodings for signed transactions.
//!
//! A durable transaction is meant to be signed now and submitted later, so it
//! has to survive a round trip through text. These helpers apply the same
//! size limits the JSON RPC service enforces on `sendTransaction`.

use {
    crate::error::{Error, Result},
    base64::{prelude::BASE64_STANDARD, Engine},
    serde_derive::{Deserialize, Serialize},
    solana_sdk::{packet::PACKET_DATA_SIZE, transaction::Transaction},
    std::{fmt, str::FromStr},
};

// Encoded lengths of a PACKET_DATA_SIZE payload.
pub const MAX_BASE58_SIZE: usize = 1683;
pub const MAX_BASE64_SIZE: usize = 1644;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransportEncoding {
    Base58, // base-58 encoded string. SLOW!
    #[default]
    Base64,
}

impl TransportEncoding {
    pub fn max_encoded_len(self) -> usize {
        match self {
            Self::Base58 => MAX_BASE58_SIZE,
            Self::Base64 => MAX_BASE64_SIZE,
        }
    }
}

impl fmt::Display for TransportEncoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Base58 => write!(f, "base58"),
            Self::Base64 => write!(f, "base64"),
        }
    }
}

impl FromStr for TransportEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "base58" => Ok(Self::Base58),
            "base64" => Ok(Self::Base64),
            _ => Err(format!("unsupported transport encoding: {s}")),
        }
    }
}

pub fn encode_transaction(
    transaction: &Transaction,
    encoding: TransportEncoding,
) -> Result<String> {
    let serialized = bincode::serialize(transaction)?;
    if serialized.len() > PACKET_DATA_SIZE {
        return Err(Error::SerializedTooLarge {
            len: serialized.len(),
            max: PACKET_DATA_SIZE,
        });
    }
    Ok(match encoding {
        TransportEncoding::Base58 => bs58::encode(serialized).into_string(),
        TransportEncoding::Base64 => BASE64_STANDARD.encode(serialized),
    })
}

pub fn decode_transaction(encoded: &str, encoding: TransportEncoding) -> Result<Transaction> {
    let max = encoding.max_encoded_len();
    if encoded.len() > max {
        return Err(Error::EncodedTooLarge {
            len: encoded.len(),
            max,
        });
    }
    let wire = match encoding {
        TransportEncoding::Base58 => bs58::decode(encoded).into_vec()?,
        TransportEncoding::Base64 => BASE64_STANDARD.decode(encoded)?,
    };
    if wire.len() > PACKET_DATA_SIZE {
        return Err(Error::SerializedTooLarge {
            len: wire.len(),
            max: PACKET_DATA_SIZE,
        });
    }
    Ok(bincode::deserialize(&wire)?)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        solana_sdk::{
            hash::Hash,
            pubkey::Pubkey,
            signature::{Keypair, Signer},
            system_transaction,
        },
    };

    #[test]
    fn test_transaction_survives_both_encodings() {
        let from = Keypair::new();
        let tx =
            system_transaction::transfer(&from, &Pubkey::new_unique(), 42, Hash::new_unique());

        for encoding in [TransportEncoding::Base58, TransportEncoding::Base64] {
            let encoded = encode_transaction(&tx, encoding).unwrap();
            assert!(encoded.len() <= encoding.max_encoded_len());
            let decoded = decode_transaction(&encoded, encoding).unwrap();
            assert_eq!(decoded, tx);
            assert_eq!(decoded.signatures[0], tx.signatures[0]);
            assert!(decoded.verify().is_ok());
            assert_eq!(decoded.message.account_keys[0], from.pubkey());
        }
    }

    #[test]
    fn test_decode_rejects_oversized_input() {
        let too_long = "A".repeat(MAX_BASE64_SIZE + 1);
        assert!(matches!(
            decode_transaction(&too_long, TransportEncoding::Base64),
            Err(Error::EncodedTooLarge { max: MAX_BASE64_SIZE, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_transaction("0OIl", TransportEncoding::Base58),
            Err(Error::Base58(_))
        ));
        assert!(matches!(
            decode_transaction("!!!!", TransportEncoding::Base64),
            Err(Error::Base64(_))
        ));
        let not_a_transaction = BASE64_STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(
            decode_transaction(&not_a_transaction, TransportEncoding::Base64),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("base58".parse(), Ok(TransportEncoding::Base58));
        assert_eq!("base64".parse(), Ok(TransportEncoding::Base64));
        assert!("binary".parse::<TransportEncoding>().is_err());
        assert_eq!(TransportEncoding::Base58.to_string(), "base58");
        assert_eq!(
            serde_json::to_string(&TransportEncoding::Base64).unwrap(),
            "\"base64\""
        );
    }
}
