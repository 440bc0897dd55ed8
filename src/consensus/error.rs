use thiserror::Error;

use super::block::BlockDecodeError;

/// Why a node dropped an incoming `Proposal` or `Vote`. None of these are
/// fatal: the dispatcher in [`super::node::ConsensusNode::handle_message`]
/// logs the reason at `debug` and moves on. There is no retry and no
/// response sent back to the offending sender.
#[derive(Debug, Error)]
pub enum RejectReason {
    #[error("sender {sender} is not the expected leader {expected} for epoch {epoch}")]
    InvalidLeader {
        sender: String,
        expected: String,
        epoch: u64,
    },

    #[error("no public key registered for signer {0}")]
    UnknownSigner(String),

    #[error("signature failed to verify")]
    SignatureInvalid,

    #[error("recomputed block hash does not match the proposal's claimed hash")]
    HashMismatch,

    #[error("block bytes failed to decode: {0}")]
    EncodingInvalid(#[from] BlockDecodeError),

    #[error("already voted in epoch {0}")]
    DoubleVote(u64),

    #[error("voter {0} already counted for this block")]
    DuplicateVote(String),

    #[error("proposal's parent is not the tip of any longest notarized chain")]
    ParentNotNotarized,
}
