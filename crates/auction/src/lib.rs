//! Second-price builder auction over a registry of staked builders.
//!
//! Supplemental to the core engine components: grounded in the
//! relay/auctioneer shape from `mev-relay-rs`'s `AuctionContext` (a value
//! carried alongside a submitted bid) and the builder-registry pattern in
//! `mev-boost-rs`'s `RelayMux`, but generalized here to the spec's own
//! `AuctionBid{builder_id, slot, value, gas_limit, payload, signature}`
//! shape and reth's typed-error/`parking_lot` conventions.

use alloy_primitives::{Address, Bytes, U256};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuctionError {
    #[error("builder {0:?} is not registered")]
    UnknownBuilder(Address),
    #[error("builder {builder:?} has stake {stake}, below the minimum {min_stake}")]
    InsufficientStake { builder: Address, stake: U256, min_stake: U256 },
    #[error("no bids were submitted for slot {0}")]
    NoBids(u64),
}

/// A builder registered to participate in auctions, identified by address
/// and carrying a collateral stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredBuilder {
    pub builder_id: Address,
    pub stake: U256,
}

/// `{builder_id, slot, value, gas_limit, payload, signature}` per the spec's
/// `AuctionBid` record. `payload`/`signature` stay opaque byte strings; this
/// crate only orders and selects, it never decodes a bid's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionBid {
    pub builder_id: Address,
    pub slot: u64,
    pub value: U256,
    pub gas_limit: u64,
    pub payload: Bytes,
    pub signature: Bytes,
}

/// The result of running the auction for one slot: the winner plus enough
/// of the runner-up's bid to support a second-price settlement decision
/// made by the caller (this crate does not itself move funds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionResult {
    pub slot: u64,
    pub winner: Address,
    pub winning_value: U256,
    pub second_price: U256,
    pub total_bids: usize,
}

struct Inner {
    builders: HashMap<Address, RegisteredBuilder>,
    bids: HashMap<u64, Vec<AuctionBid>>,
}

/// Registry of staked builders plus a per-slot bid book. One write lock
/// guards both, mirroring the rest of the workspace's one-lock-per-component
/// convention.
pub struct Auctioneer {
    inner: RwLock<Inner>,
    min_stake: U256,
}

impl Auctioneer {
    pub fn new(min_stake: U256) -> Self {
        Self {
            inner: RwLock::new(Inner { builders: HashMap::new(), bids: HashMap::new() }),
            min_stake,
        }
    }

    /// Registers or re-stakes a builder. Re-registering replaces the stake
    /// on file; it does not accumulate.
    pub fn register_builder(&self, builder_id: Address, stake: U256) {
        self.inner.write().builders.insert(builder_id, RegisteredBuilder { builder_id, stake });
    }

    pub fn stake_of(&self, builder_id: Address) -> Option<U256> {
        self.inner.read().builders.get(&builder_id).map(|b| b.stake)
    }

    /// Submits a bid. Rejects unregistered builders and builders whose
    /// staked collateral has since dropped below `min_stake`.
    pub fn submit_bid(&self, bid: AuctionBid) -> Result<(), AuctionError> {
        let mut guard = self.inner.write();
        let builder = *guard
            .builders
            .get(&bid.builder_id)
            .ok_or(AuctionError::UnknownBuilder(bid.builder_id))?;
        if builder.stake < self.min_stake {
            return Err(AuctionError::InsufficientStake {
                builder: bid.builder_id,
                stake: builder.stake,
                min_stake: self.min_stake,
            });
        }
        guard.bids.entry(bid.slot).or_default().push(bid);
        Ok(())
    }

    /// Runs the second-price auction for `slot`: the highest bid wins, but
    /// `second_price` reports the value of the runner-up (a single bid is
    /// its own runner-up, per spec.md's single-bid semantics).
    pub fn run_auction(&self, slot: u64) -> Result<AuctionResult, AuctionError> {
        let guard = self.inner.read();
        let bids = guard.bids.get(&slot).ok_or(AuctionError::NoBids(slot))?;
        if bids.is_empty() {
            return Err(AuctionError::NoBids(slot));
        }

        let mut sorted: Vec<&AuctionBid> = bids.iter().collect();
        sorted.sort_by(|a, b| b.value.cmp(&a.value));

        let winner = sorted[0];
        let second_price = sorted.get(1).map(|bid| bid.value).unwrap_or(winner.value);

        Ok(AuctionResult {
            slot,
            winner: winner.builder_id,
            winning_value: winner.value,
            second_price,
            total_bids: bids.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn bid(builder: Address, slot: u64, value: u64) -> AuctionBid {
        AuctionBid {
            builder_id: builder,
            slot,
            value: U256::from(value),
            gas_limit: 30_000_000,
            payload: Bytes::new(),
            signature: Bytes::new(),
        }
    }

    #[test]
    fn second_price_auction_over_three_bids() {
        let auctioneer = Auctioneer::new(U256::from(200u64));
        let (b1, b2, b3) = (addr(1), addr(2), addr(3));
        for b in [b1, b2, b3] {
            auctioneer.register_builder(b, U256::from(200u64));
        }
        auctioneer.submit_bid(bid(b1, 5, 100)).unwrap();
        auctioneer.submit_bid(bid(b2, 5, 200)).unwrap();
        auctioneer.submit_bid(bid(b3, 5, 150)).unwrap();

        let result = auctioneer.run_auction(5).unwrap();
        assert_eq!(result.winner, b2);
        assert_eq!(result.winning_value, U256::from(200u64));
        assert_eq!(result.second_price, U256::from(150u64));
        assert_eq!(result.total_bids, 3);
    }

    #[test]
    fn unregistered_builder_is_rejected() {
        let auctioneer = Auctioneer::new(U256::from(200u64));
        let err = auctioneer.submit_bid(bid(addr(9), 1, 100)).unwrap_err();
        assert_eq!(err, AuctionError::UnknownBuilder(addr(9)));
    }

    #[test]
    fn stake_below_minimum_is_rejected() {
        let auctioneer = Auctioneer::new(U256::from(200u64));
        auctioneer.register_builder(addr(1), U256::from(50u64));
        let err = auctioneer.submit_bid(bid(addr(1), 1, 100)).unwrap_err();
        assert_matches::assert_matches!(err, AuctionError::InsufficientStake { .. });
    }

    #[test]
    fn a_single_bid_is_its_own_runner_up() {
        let auctioneer = Auctioneer::new(U256::from(200u64));
        auctioneer.register_builder(addr(1), U256::from(200u64));
        auctioneer.submit_bid(bid(addr(1), 5, 300)).unwrap();
        let result = auctioneer.run_auction(5).unwrap();
        assert_eq!(result.winning_value, result.second_price);
    }

    #[test]
    fn no_bids_for_a_slot_is_an_error() {
        let auctioneer = Auctioneer::new(U256::from(200u64));
        let err = auctioneer.run_auction(99).unwrap_err();
        assert_eq!(err, AuctionError::NoBids(99));
    }
}
