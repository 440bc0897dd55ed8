use std::collections::{HashMap, HashSet};

use super::block::Block;

/// A simple linear chain validator, independent of the consensus node's
/// branching chain registry below. It enforces the two structural rules a
/// block must satisfy to extend a chain: its `parent_hash` must be the
/// current tip, and its epoch must be strictly greater than the tip's.
///
/// Not wired into the per-epoch hot path of `ConsensusNode` — it is a
/// standalone sanity check over a single already-agreed-upon branch.
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new(genesis: Block) -> Self {
        Chain {
            blocks: vec![genesis],
        }
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("a chain always has a tip")
    }

    pub fn validate_and_add(&mut self, block: Block) -> bool {
        if block.parent_hash.as_deref() != Some(self.tip().hash().as_str()) {
            return false;
        }
        if block.epoch <= self.tip().epoch {
            return false;
        }
        self.blocks.push(block);
        true
    }
}

/// All chains in `chains` whose every element is notarized, restricted to
/// the maximal length among those; ties are preserved in registry order.
/// Falls back to `[[genesis_hash]]` if no chain (including the trivial
/// genesis-only chain) qualifies, which cannot actually happen once genesis
/// is notarized at construction but keeps the function total.
pub fn longest_notarized_chains(
    chains: &[Vec<String>],
    notarized: &HashSet<String>,
    genesis_hash: &str,
) -> Vec<Vec<String>> {
    let mut candidates: Vec<Vec<String>> = Vec::new();
    let mut max_len = 0usize;
    for chain in chains {
        if chain.iter().all(|hash| notarized.contains(hash)) {
            match chain.len().cmp(&max_len) {
                std::cmp::Ordering::Greater => {
                    candidates = vec![chain.clone()];
                    max_len = chain.len();
                }
                std::cmp::Ordering::Equal => candidates.push(chain.clone()),
                std::cmp::Ordering::Less => {}
            }
        }
    }
    if candidates.is_empty() {
        vec![vec![genesis_hash.to_string()]]
    } else {
        candidates
    }
}

/// Extend the chain registry with a newly notarized block: append to every
/// chain whose tip is the block's parent, or start a new branch if none
/// matches, then dedupe so each tip hash keeps only its
/// longest chain.
pub fn extend_with_notarized(
    chains: &mut Vec<Vec<String>>,
    blocks_by_hash: &HashMap<String, Block>,
    block_hash: &str,
) {
    let Some(parent) = blocks_by_hash
        .get(block_hash)
        .and_then(|block| block.parent_hash.clone())
    else {
        return;
    };

    let mut extended = false;
    let mut next: Vec<Vec<String>> = Vec::with_capacity(chains.len() + 1);
    for chain in chains.iter() {
        if chain.last() == Some(&parent) {
            let mut grown = chain.clone();
            grown.push(block_hash.to_string());
            next.push(grown);
            extended = true;
        } else {
            next.push(chain.clone());
        }
    }
    if !extended {
        next.push(vec![parent, block_hash.to_string()]);
    }

    *chains = dedupe_longest(next);
}

/// Keep only the longest chain per tip hash. Implemented as a linear scan
/// over a `Vec`, not a `HashMap`, so that ties are broken by first-seen
/// position rather than by Rust's randomized hash-map iteration order —
/// the registry's ordering must be reproducible run over run.
fn dedupe_longest(chains: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut result: Vec<Vec<String>> = Vec::with_capacity(chains.len());
    for chain in chains {
        let tip = chain.last().cloned();
        match result.iter_mut().find(|existing| existing.last() == tip.as_ref()) {
            Some(existing) if chain.len() > existing.len() => *existing = chain,
            Some(_) => {}
            None => result.push(chain),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_validation_rules() {
        let genesis = Block::new(None, 0, Vec::new(), "g");
        let mut chain = Chain::new(genesis.clone());

        let b1 = Block::new(Some(genesis.hash()), 1, Vec::new(), "0");
        assert!(chain.validate_and_add(b1.clone()));

        let bad_parent = Block::new(Some("deadbeef".to_string()), 2, Vec::new(), "0");
        assert!(!chain.validate_and_add(bad_parent));

        let bad_epoch = Block::new(Some(b1.hash()), 1, Vec::new(), "0");
        assert!(!chain.validate_and_add(bad_epoch));
    }

    #[test]
    fn extend_with_notarized_appends_to_matching_tip() {
        let genesis = Block::genesis();
        let genesis_hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash.clone(), genesis);

        let b1 = Block::new(Some(genesis_hash.clone()), 1, Vec::new(), "0");
        let b1_hash = b1.hash();
        blocks.insert(b1_hash.clone(), b1);

        let mut chains = vec![vec![genesis_hash.clone()]];
        extend_with_notarized(&mut chains, &blocks, &b1_hash);
        assert_eq!(chains, vec![vec![genesis_hash, b1_hash]]);
    }

    #[test]
    fn extend_with_notarized_starts_new_branch_when_parent_not_a_tip() {
        let genesis = Block::genesis();
        let genesis_hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash.clone(), genesis);

        let b1 = Block::new(Some(genesis_hash.clone()), 1, Vec::new(), "0");
        let b1_hash = b1.hash();
        let b2 = Block::new(Some(b1_hash.clone()), 2, Vec::new(), "1");
        let b2_hash = b2.hash();
        blocks.insert(b1_hash.clone(), b1);
        blocks.insert(b2_hash.clone(), b2);

        // b2 arrives (and notarizes) before its parent b1 is attached to any
        // chain tip: a forward-only fragment [b1_hash, b2_hash] is recorded.
        let mut chains = vec![vec![genesis_hash]];
        extend_with_notarized(&mut chains, &blocks, &b2_hash);
        assert!(chains.contains(&vec![b1_hash, b2_hash]));
    }

    #[test]
    fn longest_notarized_chains_prefers_maximal_length() {
        let genesis_hash = "g".to_string();
        let a = "a".to_string();
        let b = "b".to_string();
        let c = "c".to_string();
        let chains = vec![
            vec![genesis_hash.clone(), a.clone()],
            vec![genesis_hash.clone(), a.clone(), b.clone()],
            vec![genesis_hash.clone(), c.clone()],
        ];
        let notarized: HashSet<String> = [genesis_hash.clone(), a.clone(), b.clone(), c.clone()]
            .into_iter()
            .collect();
        let longest = longest_notarized_chains(&chains, &notarized, &genesis_hash);
        assert_eq!(longest, vec![vec![genesis_hash, a, b]]);
    }

    #[test]
    fn longest_notarized_chains_skips_chains_with_un_notarized_members() {
        let genesis_hash = "g".to_string();
        let a = "a".to_string();
        let chains = vec![vec![genesis_hash.clone(), a.clone()]];
        let notarized: HashSet<String> = [genesis_hash.clone()].into_iter().collect();
        let longest = longest_notarized_chains(&chains, &notarized, &genesis_hash);
        assert_eq!(longest, vec![vec![genesis_hash]]);
    }
}
