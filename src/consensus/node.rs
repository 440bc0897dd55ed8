use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use p256::ecdsa::VerifyingKey;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::block::{Block, Transaction};
use super::broker::Broker;
use super::chain::{extend_with_notarized, longest_notarized_chains};
use super::error::RejectReason;
use super::keys::KeyManager;
use super::messages::{Message, Proposal, Vote};

/// Shared, single-threaded public key registry: node_id -> public key.
/// Populated once per node at construction time, then treated as read-only.
/// `Rc<RefCell<_>>` rather than `Arc<Mutex<_>>` because the whole simulation
/// runs on one thread.
pub type PublicKeyRegistry = Rc<RefCell<HashMap<String, VerifyingKey>>>;

/// `⌈2N/3⌉`, the number of distinct votes a block needs to be notarized.
pub fn quorum_threshold(total_nodes: usize) -> usize {
    (2 * total_nodes + 2) / 3
}

/// Largest canonical encoding a single transaction may have before
/// `submit_transaction` refuses it.
pub const MAX_TRANSACTION_BYTES: usize = 2000;

/// Largest combined canonical encoding of the transactions a proposed block
/// may carry; `propose` stops taking more from the mempool once adding the
/// next one would cross this.
pub const MAX_BLOCK_TRANSACTIONS_BYTES: usize = 10000;

fn encoded_size(transaction: &Transaction) -> usize {
    serde_json::to_vec(transaction)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX)
}

/// `SHA-256(decimal-ascii(epoch)) mod total_nodes`, reduced byte-by-byte
/// (Horner's method) so no big-integer type is needed, then rendered back
/// out as a decimal node id.
pub fn expected_leader_for_epoch(epoch: u64, total_nodes: usize) -> String {
    let digest = Sha256::digest(epoch.to_string().as_bytes());
    let total_nodes = total_nodes as u64;
    let mut remainder: u64 = 0;
    for byte in digest.iter() {
        remainder = (remainder * 256 + u64::from(*byte)) % total_nodes;
    }
    remainder.to_string()
}

/// One participant's view of the protocol: its blocks, votes, notarized set,
/// chain registry, and finalized log, plus the signing identity and shared
/// handles (broker, public key registry) it needs to participate.
pub struct ConsensusNode {
    pub node_id: String,
    total_nodes: usize,
    key_manager: KeyManager,
    public_keys: PublicKeyRegistry,
    broker: Broker,

    genesis_hash: String,
    blocks_by_hash: HashMap<String, Block>,
    votes_by_block: HashMap<String, HashSet<String>>,
    notarized_blocks: HashSet<String>,
    chains: Vec<Vec<String>>,
    finalized_log: Vec<Transaction>,
    finalized_blocks: HashSet<String>,
    mempool: VecDeque<Transaction>,
    voted_in_epoch: HashSet<u64>,
}

impl ConsensusNode {
    /// Construct a node, register it with `broker`, and publish its public
    /// key into the shared `public_keys` registry. Every node independently
    /// builds the same genesis block and marks it notarized.
    pub fn new(
        node_id: String,
        broker: Broker,
        public_keys: PublicKeyRegistry,
        total_nodes: usize,
    ) -> Self {
        let key_manager = KeyManager::new();
        public_keys
            .borrow_mut()
            .insert(node_id.clone(), key_manager.verifying_key());
        broker.register(&node_id);

        let genesis = Block::genesis();
        let genesis_hash = genesis.hash();
        let mut blocks_by_hash = HashMap::new();
        blocks_by_hash.insert(genesis_hash.clone(), genesis);
        let mut notarized_blocks = HashSet::new();
        notarized_blocks.insert(genesis_hash.clone());

        ConsensusNode {
            node_id,
            total_nodes,
            key_manager,
            public_keys,
            broker,
            genesis_hash: genesis_hash.clone(),
            blocks_by_hash,
            votes_by_block: HashMap::new(),
            notarized_blocks,
            chains: vec![vec![genesis_hash]],
            finalized_log: Vec::new(),
            finalized_blocks: HashSet::new(),
            mempool: VecDeque::new(),
            voted_in_epoch: HashSet::new(),
        }
    }

    pub fn genesis_hash(&self) -> &str {
        &self.genesis_hash
    }

    pub fn finalized_log(&self) -> &[Transaction] {
        &self.finalized_log
    }

    pub fn notarized_blocks(&self) -> &HashSet<String> {
        &self.notarized_blocks
    }

    pub fn votes_for(&self, block_hash: &str) -> usize {
        self.votes_by_block
            .get(block_hash)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub fn chains(&self) -> &[Vec<String>] {
        &self.chains
    }

    /// The transactions of a known block, if this node has learned it.
    pub fn block_transactions(&self, block_hash: &str) -> Option<&[Transaction]> {
        self.blocks_by_hash
            .get(block_hash)
            .map(|block| block.transactions.as_slice())
    }

    pub fn voted_in_epoch(&self, epoch: u64) -> bool {
        self.voted_in_epoch.contains(&epoch)
    }

    /// A user submitting a transaction to be included in a future block.
    /// Transactions over `MAX_TRANSACTION_BYTES` in their canonical encoding
    /// are refused rather than queued.
    pub fn submit_transaction(&mut self, transaction: Transaction) {
        let size = encoded_size(&transaction);
        if size > MAX_TRANSACTION_BYTES {
            debug!(node = %self.node_id, size, limit = MAX_TRANSACTION_BYTES, "refusing oversized transaction");
            return;
        }
        self.mempool.push_back(transaction);
    }

    /// Dispatch an incoming wire message, logging (never propagating) any
    /// rejection.
    pub fn handle_message(&mut self, message: Message) {
        let result = match message {
            Message::Proposal(proposal) => self.on_receive_proposal(proposal),
            Message::Vote(vote) => self.on_receive_vote(vote),
        };
        if let Err(reason) = result {
            debug!(node = %self.node_id, %reason, "dropping message");
        }
    }

    /// If this node is the leader for `epoch`, build, store, sign, and
    /// broadcast a new block. A no-op for every other node.
    pub fn propose(&mut self, epoch: u64) {
        if expected_leader_for_epoch(epoch, self.total_nodes) != self.node_id {
            return;
        }

        let chosen =
            longest_notarized_chains(&self.chains, &self.notarized_blocks, &self.genesis_hash);
        let parent_hash = chosen[0]
            .last()
            .cloned()
            .expect("every chain has at least a tip");

        let block = Block::new(
            Some(parent_hash),
            epoch,
            self.snapshot_mempool_for_block(),
            self.node_id.clone(),
        );
        let block_bytes = block.serialize();
        let block_hash = block.hash();
        self.blocks_by_hash.insert(block_hash.clone(), block);

        let signature = self.key_manager.sign(&block_bytes);
        debug!(node = %self.node_id, epoch, block_hash = %block_hash, "proposing block");
        self.broker.broadcast(Proposal {
            sender_id: self.node_id.clone(),
            epoch,
            block_hash,
            block_bytes,
            signature,
        });
    }

    /// Snapshot of `mempool`, in order, truncated before the running total of
    /// canonical-encoded transaction bytes would cross
    /// `MAX_BLOCK_TRANSACTIONS_BYTES`. The mempool itself is left untouched.
    fn snapshot_mempool_for_block(&self) -> Vec<Transaction> {
        let mut included = Vec::new();
        let mut total = 0usize;
        for transaction in &self.mempool {
            let size = encoded_size(transaction);
            if total + size > MAX_BLOCK_TRANSACTIONS_BYTES {
                break;
            }
            total += size;
            included.push(transaction.clone());
        }
        included
    }

    fn on_receive_proposal(&mut self, proposal: Proposal) -> Result<(), RejectReason> {
        let expected = expected_leader_for_epoch(proposal.epoch, self.total_nodes);
        if proposal.sender_id != expected {
            return Err(RejectReason::InvalidLeader {
                sender: proposal.sender_id,
                expected,
                epoch: proposal.epoch,
            });
        }

        let sender_key = self
            .public_keys
            .borrow()
            .get(&proposal.sender_id)
            .copied()
            .ok_or_else(|| RejectReason::UnknownSigner(proposal.sender_id.clone()))?;
        if !KeyManager::verify(&sender_key, &proposal.signature, &proposal.block_bytes) {
            return Err(RejectReason::SignatureInvalid);
        }

        if !self.blocks_by_hash.contains_key(&proposal.block_hash) {
            let block = Block::deserialize(&proposal.block_bytes)?;
            if block.hash() != proposal.block_hash {
                return Err(RejectReason::HashMismatch);
            }
            self.blocks_by_hash
                .insert(proposal.block_hash.clone(), block);
        }

        if self.voted_in_epoch.contains(&proposal.epoch) {
            return Err(RejectReason::DoubleVote(proposal.epoch));
        }

        let parent_hash = self
            .blocks_by_hash
            .get(&proposal.block_hash)
            .expect("just inserted or already known")
            .parent_hash
            .clone();
        let longest =
            longest_notarized_chains(&self.chains, &self.notarized_blocks, &self.genesis_hash);
        let parent_ok = longest
            .iter()
            .any(|chain| chain.last() == parent_hash.as_ref());
        if !parent_ok {
            return Err(RejectReason::ParentNotNotarized);
        }

        let signature = self.key_manager.sign(&proposal.block_bytes);
        self.voted_in_epoch.insert(proposal.epoch);
        debug!(node = %self.node_id, epoch = proposal.epoch, block_hash = %proposal.block_hash, "voting");
        self.broker.broadcast(Vote {
            sender_id: self.node_id.clone(),
            epoch: proposal.epoch,
            block_hash: proposal.block_hash,
            block_bytes: proposal.block_bytes,
            signature,
            for_leader_id: Some(proposal.sender_id),
        });
        Ok(())
    }

    fn on_receive_vote(&mut self, vote: Vote) -> Result<(), RejectReason> {
        let sender_key = self
            .public_keys
            .borrow()
            .get(&vote.sender_id)
            .copied()
            .ok_or_else(|| RejectReason::UnknownSigner(vote.sender_id.clone()))?;
        if !KeyManager::verify(&sender_key, &vote.signature, &vote.block_bytes) {
            return Err(RejectReason::SignatureInvalid);
        }

        let voters = self
            .votes_by_block
            .entry(vote.block_hash.clone())
            .or_default();
        if voters.contains(&vote.sender_id) {
            return Err(RejectReason::DuplicateVote(vote.sender_id));
        }
        voters.insert(vote.sender_id);
        let count = voters.len();

        if count >= quorum_threshold(self.total_nodes) {
            self.notarized_blocks.insert(vote.block_hash.clone());
            extend_with_notarized(&mut self.chains, &self.blocks_by_hash, &vote.block_hash);
            self.check_finalization();
        }
        Ok(())
    }

    /// Scan every chain for three consecutive notarized blocks whose epochs
    /// are consecutive integers, and append the middle block's transactions
    /// to `finalized_log` — at most once per block hash. `finalized_blocks`
    /// is the dedup guard that keeps a repeated scan from appending the same
    /// block's transactions twice.
    fn check_finalization(&mut self) {
        let mut newly_finalized: Vec<String> = Vec::new();

        for chain in &self.chains {
            if chain.len() < 3 {
                continue;
            }
            let mut epochs = Vec::with_capacity(chain.len());
            let mut all_known = true;
            for hash in chain {
                match self.blocks_by_hash.get(hash) {
                    Some(block) => epochs.push(block.epoch),
                    None => {
                        all_known = false;
                        break;
                    }
                }
            }
            if !all_known {
                continue;
            }

            for i in 0..chain.len() - 2 {
                let (h1, h2, h3) = (&chain[i], &chain[i + 1], &chain[i + 2]);
                if !self.notarized_blocks.contains(h1)
                    || !self.notarized_blocks.contains(h2)
                    || !self.notarized_blocks.contains(h3)
                {
                    continue;
                }
                let (e1, e2, e3) = (epochs[i], epochs[i + 1], epochs[i + 2]);
                if e2 == e1 + 1 && e3 == e2 + 1 && !self.finalized_blocks.contains(h2) {
                    newly_finalized.push(h2.clone());
                }
            }
        }

        for hash in newly_finalized {
            if self.finalized_blocks.insert(hash.clone()) {
                let transactions = self
                    .blocks_by_hash
                    .get(&hash)
                    .expect("finalized block must be known")
                    .transactions
                    .clone();
                debug!(node = %self.node_id, block_hash = %hash, count = transactions.len(), "finalizing block");
                self.finalized_log.extend(transactions);
            }
        }
    }
}
