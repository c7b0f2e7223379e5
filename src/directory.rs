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

//! Directory of known mixnodes and route selection over it.

use crate::{client::PathHop, error::SphinxError, wire::MixnodeIndex};
use curve25519_dalek::ristretto::RistrettoPoint;
use parking_lot::RwLock;
use rand::{seq::SliceRandom, CryptoRng, Rng};
use rand_distr::{Distribution, Exp};
use std::collections::HashMap;

/// A mixnode as published in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mixnode {
	pub id: MixnodeIndex,
	pub host: String,
	pub port: u16,
	pub public_key: RistrettoPoint,
}

/// Shared, mutable view of the known mixnodes. Readers take routes concurrently while the
/// directory is refreshed.
#[derive(Default)]
pub struct MixnodeDirectory {
	nodes: RwLock<HashMap<MixnodeIndex, Mixnode>>,
}

impl MixnodeDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add or replace a node.
	pub fn put(&self, node: Mixnode) {
		self.nodes.write().insert(node.id, node);
	}

	pub fn by_id(&self, id: MixnodeIndex) -> Option<Mixnode> {
		self.nodes.read().get(&id).cloned()
	}

	/// Snapshot of all published nodes, ordered by id.
	pub fn all(&self) -> Vec<Mixnode> {
		let mut nodes: Vec<_> = self.nodes.read().values().cloned().collect();
		nodes.sort_by_key(|node| node.id);
		nodes
	}

	/// Ids of all published nodes, ascending.
	pub fn ids(&self) -> Vec<MixnodeIndex> {
		let mut ids: Vec<_> = self.nodes.read().keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	pub fn len(&self) -> usize {
		self.nodes.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.read().is_empty()
	}
}

/// Strategy for drawing a route from a directory snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteProvider {
	/// Uniformly random distinct nodes in random order. The only strategy with mixing value;
	/// the ordered ones exist for reproducible tests and topology experiments.
	Random,
	/// The `count` published nodes with the lowest ids, ascending.
	Ascending,
	/// The `count` published nodes with the highest ids, descending.
	Descending,
}

impl RouteProvider {
	/// Draw a `count`-hop route over `directory` with per-hop delays sampled around
	/// `mean_delay_ms`.
	pub fn choose(
		&self,
		directory: &MixnodeDirectory,
		count: usize,
		mean_delay_ms: f64,
		rng: &mut (impl Rng + CryptoRng),
	) -> Result<Vec<PathHop>, SphinxError> {
		let pool = directory.all();
		if count > pool.len() {
			return Err(SphinxError::RouteCountExceedsPool {
				requested: count,
				available: pool.len(),
			})
		}
		let nodes: Vec<Mixnode> = match self {
			RouteProvider::Random => pool.choose_multiple(rng, count).cloned().collect(),
			RouteProvider::Ascending => pool[..count].to_vec(),
			RouteProvider::Descending => pool.iter().rev().take(count).cloned().collect(),
		};
		Ok(nodes
			.into_iter()
			.map(|node| {
				PathHop {
					id: node.id,
					delay_ms: sample_delay(rng, mean_delay_ms),
					public_key: node.public_key,
				}
			})
			.collect())
	}
}

/// Sample a forwarding delay from an exponential distribution with the given mean. Exponential
/// delays make per-hop timing memoryless, which is what stops an observer correlating packet
/// arrival and departure times.
pub fn sample_delay(rng: &mut impl Rng, mean_ms: f64) -> u32 {
	debug_assert!(mean_ms > 0.0);
	let exp = Exp::new(1.0 / mean_ms).expect("rate is positive and finite");
	exp.sample(rng).min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::KeyPair;
	use rand::rngs::OsRng;

	fn directory(n: usize) -> MixnodeDirectory {
		let directory = MixnodeDirectory::new();
		for i in 0..n {
			directory.put(Mixnode {
				id: i as MixnodeIndex,
				host: format!("mix{i}.example.net"),
				port: 4000 + i as u16,
				public_key: *KeyPair::gen(&mut OsRng).public(),
			});
		}
		directory
	}

	#[test]
	fn route_longer_than_pool_rejected() {
		let directory = directory(3);
		assert_eq!(
			RouteProvider::Random.choose(&directory, 4, 100.0, &mut OsRng).unwrap_err(),
			SphinxError::RouteCountExceedsPool { requested: 4, available: 3 }
		);
		assert!(RouteProvider::Random.choose(&directory, 3, 100.0, &mut OsRng).is_ok());
	}

	#[test]
	fn random_routes_have_distinct_hops() {
		let directory = directory(10);
		for _ in 0..20 {
			let route = RouteProvider::Random.choose(&directory, 5, 100.0, &mut OsRng).unwrap();
			let mut ids: Vec<_> = route.iter().map(|hop| hop.id).collect();
			ids.sort_unstable();
			ids.dedup();
			assert_eq!(ids.len(), 5);
		}
	}

	#[test]
	fn ordered_strategies_are_deterministic() {
		let directory = directory(5);
		let up = RouteProvider::Ascending.choose(&directory, 3, 100.0, &mut OsRng).unwrap();
		assert_eq!(up.iter().map(|hop| hop.id).collect::<Vec<_>>(), vec![0, 1, 2]);
		let down = RouteProvider::Descending.choose(&directory, 3, 100.0, &mut OsRng).unwrap();
		assert_eq!(down.iter().map(|hop| hop.id).collect::<Vec<_>>(), vec![4, 3, 2]);
	}

	#[test]
	fn replacing_a_node_keeps_directory_size() {
		let directory = directory(2);
		let mut node = directory.by_id(1).unwrap();
		node.port = 9999;
		directory.put(node);
		assert_eq!(directory.len(), 2);
		assert_eq!(directory.by_id(1).unwrap().port, 9999);
	}

	#[test]
	fn delays_are_spread_around_the_mean() {
		let mut rng = OsRng;
		let mean = 500.0;
		let samples: Vec<u32> = (0..1000).map(|_| sample_delay(&mut rng, mean)).collect();
		let average = samples.iter().map(|&d| d as f64).sum::<f64>() / samples.len() as f64;
		assert!(average > mean * 0.8 && average < mean * 1.2);
		assert!(samples.iter().any(|&d| d < 100));
		assert!(samples.iter().any(|&d| d > 1000));
	}
}
