use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Transactions are opaque to the consensus core; they only need to be
/// representable as a JSON value so the canonical block encoding can embed
/// them recursively under the same sorted-key rule as the block itself.
pub type Transaction = Value;

/// An immutable block. Two `Block` values with identical fields always
/// produce identical canonical bytes and identical hashes.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub parent_hash: Option<String>,
    pub epoch: u64,
    pub transactions: Vec<Transaction>,
    pub proposer_id: String,
}

/// Failure to reconstruct a `Block` from the bytes carried in a `Proposal`.
/// Never panics; always returned as a `Result`.
#[derive(Debug, Error)]
pub enum BlockDecodeError {
    #[error("block bytes are not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("block bytes are not a JSON object")]
    NotAnObject,
    #[error("block object missing or mistyped field `{0}`")]
    InvalidField(&'static str),
}

impl Block {
    pub fn new(
        parent_hash: Option<String>,
        epoch: u64,
        transactions: Vec<Transaction>,
        proposer_id: impl Into<String>,
    ) -> Self {
        Block {
            parent_hash,
            epoch,
            transactions,
            proposer_id: proposer_id.into(),
        }
    }

    /// The genesis block every node constructs independently at startup.
    pub fn genesis() -> Self {
        Block::new(None, 0, Vec::new(), "genesis")
    }

    /// Sorted-key, whitespace-free JSON bytes. Built from a `serde_json::Map`
    /// rather than a derived struct so key order comes from the map's own
    /// (sorted) iteration order, not from field declaration order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut map = Map::new();
        map.insert(
            "parent_hash".to_string(),
            match &self.parent_hash {
                Some(hash) => Value::String(hash.clone()),
                None => Value::Null,
            },
        );
        map.insert("epoch".to_string(), Value::from(self.epoch));
        map.insert(
            "proposer_id".to_string(),
            Value::String(self.proposer_id.clone()),
        );
        map.insert(
            "transactions".to_string(),
            Value::Array(self.transactions.clone()),
        );
        serde_json::to_vec(&Value::Object(map)).expect("canonical block encoding never fails")
    }

    /// Lowercase hex SHA-256 of the canonical bytes.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.serialize()))
    }

    /// Reconstruct a block from the bytes a proposer broadcast. Used when a
    /// node learns about a block only through a `Proposal` it has not seen
    /// before.
    pub fn deserialize(bytes: &[u8]) -> Result<Block, BlockDecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let obj = value.as_object().ok_or(BlockDecodeError::NotAnObject)?;

        let parent_hash = match obj.get("parent_hash") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(BlockDecodeError::InvalidField("parent_hash")),
        };
        let epoch = obj
            .get("epoch")
            .and_then(Value::as_u64)
            .ok_or(BlockDecodeError::InvalidField("epoch"))?;
        let proposer_id = obj
            .get("proposer_id")
            .and_then(Value::as_str)
            .ok_or(BlockDecodeError::InvalidField("proposer_id"))?
            .to_string();
        let transactions = obj
            .get("transactions")
            .and_then(Value::as_array)
            .ok_or(BlockDecodeError::InvalidField("transactions"))?
            .clone();

        Ok(Block {
            parent_hash,
            epoch,
            transactions,
            proposer_id,
        })
    }
}
