// Copyright 2022 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Per-node replay defense.
//!
//! A Bloom filter over replay tags. False positives are possible but only cause the node to
//! drop a genuine packet, which the network must tolerate anyway; false negatives never occur,
//! so a replayed packet is always caught. The filter is keyed so that a sender cannot predict
//! which bits a tag sets and grind collisions against honest traffic.

use crate::crypto::ReplayTag;
use blake2::{digest::consts::U8, digest::Mac as _, Blake2bMac};
use log::debug;
use parking_lot::Mutex;

const FILTER_PERSONAL: &[u8; 16] = b"sphinx-replay-fl";

const NUM_BITS: usize = 1 << 23;
const NUM_WORDS: usize = NUM_BITS / 64;
/// Bits set per tag. With 2^23 bits this keeps the false positive rate comfortably under 1% for
/// about 100,000 tags per key rotation.
const NUM_HASHES: u32 = 8;

/// Bloom filter over replay tags. Allocates its bit array (1 MiB) lazily on first insertion;
/// most sessions at a node that is restarted or rotated often never insert at all.
pub struct ReplayFilter {
	key: [u8; 32],
	words: Option<Box<[u64; NUM_WORDS]>>,
}

impl ReplayFilter {
	/// `key` must be unpredictable to senders; a random value drawn at key rotation is fine.
	pub fn new(key: [u8; 32]) -> Self {
		Self { key, words: None }
	}

	pub fn insert(&mut self, tag: &ReplayTag) {
		let indices = bit_indices(&self.key, tag);
		let words = self.words.get_or_insert_with(|| Box::new([0; NUM_WORDS]));
		for index in indices {
			words[index / 64] |= 1 << (index % 64);
		}
	}

	pub fn contains(&self, tag: &ReplayTag) -> bool {
		let Some(words) = &self.words else { return false };
		bit_indices(&self.key, tag).all(|index| (words[index / 64] >> (index % 64)) & 1 == 1)
	}
}

fn bit_indices(key: &[u8; 32], tag: &ReplayTag) -> impl Iterator<Item = usize> {
	let mut mac = Blake2bMac::<U8>::new_with_salt_and_personal(key, b"", FILTER_PERSONAL)
		.expect("key and personalisation lengths are fixed and valid");
	mac.update(tag);
	let hash: [u8; 8] = mac.finalize().into_bytes().into();
	let base = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]);
	// Forcing the increment odd keeps the probe sequence from collapsing onto one bit.
	let inc = u32::from_le_bytes([hash[4], hash[5], hash[6], hash[7]]) | 1;
	(0..NUM_HASHES)
		.map(move |i| (base.wrapping_add(i.wrapping_mul(inc)) as usize) & (NUM_BITS - 1))
}

/// A [`ReplayFilter`] shared between packet-processing threads, with the check and the
/// insertion done under one lock so two copies of a packet racing each other cannot both pass.
pub struct SharedReplayFilter {
	filter: Mutex<ReplayFilter>,
}

impl SharedReplayFilter {
	pub fn new(key: [u8; 32]) -> Self {
		Self { filter: Mutex::new(ReplayFilter::new(key)) }
	}

	/// Returns `true` if the tag was fresh and is now recorded, `false` if it was (probably)
	/// seen before and the packet must be dropped.
	pub fn check_and_insert(&self, tag: &ReplayTag) -> bool {
		let mut filter = self.filter.lock();
		if filter.contains(tag) {
			debug!(target: "sphinx", "Replay tag seen before; dropping packet");
			false
		} else {
			filter.insert(tag);
			true
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::{Rng, SeedableRng};
	use rand_xoshiro::Xoshiro256StarStar;

	#[test]
	fn detects_replays() {
		let mut rng = Xoshiro256StarStar::seed_from_u64(1);
		let mut filter = ReplayFilter::new(rng.gen());
		let tags: Vec<ReplayTag> = (0..1000).map(|_| rng.gen()).collect();
		for tag in &tags {
			assert!(!filter.contains(tag));
			filter.insert(tag);
		}
		for tag in &tags {
			assert!(filter.contains(tag));
		}
	}

	#[test]
	fn false_positives_are_rare() {
		let mut rng = Xoshiro256StarStar::seed_from_u64(2);
		let mut filter = ReplayFilter::new(rng.gen());
		for _ in 0..10_000 {
			filter.insert(&rng.gen());
		}
		let false_positives =
			(0..10_000).filter(|_| filter.contains(&rng.gen())).count();
		assert!(false_positives < 10, "{false_positives} false positives");
	}

	#[test]
	fn shared_filter_admits_once() {
		let mut rng = Xoshiro256StarStar::seed_from_u64(3);
		let filter = SharedReplayFilter::new(rng.gen());
		let tag: ReplayTag = rng.gen();
		assert!(filter.check_and_insert(&tag));
		assert!(!filter.check_and_insert(&tag));
	}
}
