/// A signed block proposal. The signature is over `block_bytes`, never over
/// the claimed `block_hash`, so a recipient can verify authenticity before
/// it ever trusts the hash.
#[derive(Clone, Debug)]
pub struct Proposal {
    pub sender_id: String,
    pub epoch: u64,
    pub block_hash: String,
    pub block_bytes: Vec<u8>,
    pub signature: Vec<u8>,
}

/// A signed vote for a block, by a node that has decided to support it.
#[derive(Clone, Debug)]
pub struct Vote {
    pub sender_id: String,
    pub epoch: u64,
    pub block_hash: String,
    pub block_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub for_leader_id: Option<String>,
}

/// Wire messages as a tagged sum rather than a trait object: the broker
/// never needs to downcast, and a node's dispatcher is a single `match`.
#[derive(Clone, Debug)]
pub enum Message {
    Proposal(Proposal),
    Vote(Vote),
}

impl From<Proposal> for Message {
    fn from(proposal: Proposal) -> Self {
        Message::Proposal(proposal)
    }
}

impl From<Vote> for Message {
    fn from(vote: Vote) -> Self {
        Message::Vote(vote)
    }
}
