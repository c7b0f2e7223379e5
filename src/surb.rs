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

//! Single-use reply blocks (SURBs).
//!
//! A SURB lets a party reply to an anonymous sender without learning who they are. The sender
//! builds a header addressed back to themselves, hands out the header plus a fresh payload key,
//! and remembers the per-hop payload keys under a random identifier. A replier wraps its message
//! under the handed-out key; each hop on the return path then encrypts (not decrypts) the
//! payload further, and the original sender, who knows every key, unwinds the whole stack.

use crate::{
	client::PathHop,
	crypto::{self, PayloadKey, KEY_SIZE},
	error::SphinxError,
	header::{create_header, Header},
	padding::{pad_body, unpad_body},
	params::SphinxParams,
	wire::{MixnodeIndex, RoutingInstruction, SurbId},
};
use hashlink::{linked_hash_map::Entry, LinkedHashMap};
use log::debug;
use rand::{CryptoRng, Rng};
use subtle::ConstantTimeEq;

/// What the replier needs: where to inject the packet, the ready-made header, and the key to
/// wrap the reply payload under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NymTuple {
	/// Node the reply packet must be handed to.
	pub first_hop: MixnodeIndex,
	pub header: Header,
	/// Payload key for [`package_surb`].
	pub k_tilde: PayloadKey,
}

/// A single-use reply block: the replier-facing [`NymTuple`] plus the key material the original
/// sender must retain (normally in a [`SurbKeystore`]) to decrypt the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleUseReplyBlock {
	/// Random identifier; delivered back to the sender alongside the reply payload.
	pub id: SurbId,
	/// `k_tilde` followed by the per-hop payload keys in route order.
	pub keys: Vec<PayloadKey>,
	pub nym: NymTuple,
}

/// Build a SURB routed through `path` back to `destination` (an identifier for the sender
/// meaningful to the last hop, typically a local delivery address).
pub fn create_surb(
	params: &SphinxParams,
	rng: &mut (impl Rng + CryptoRng),
	path: &[PathHop],
	destination: &[u8],
) -> Result<SingleUseReplyBlock, SphinxError> {
	assert!(!path.is_empty(), "a route needs at least one hop");
	let mut id = SurbId::default();
	rng.fill_bytes(&mut id);

	let hop_meta: Vec<Vec<u8>> = path
		.iter()
		.map(|hop| RoutingInstruction::Relay { id: hop.id, delay_ms: hop.delay_ms }.encode())
		.collect();
	let hop_keys = path.iter().map(|hop| hop.public_key).collect::<Vec<_>>();
	let final_routing =
		RoutingInstruction::Surb { destination: destination.to_vec(), surb_id: id }.encode();
	let hs = create_header(params, rng, &hop_meta, &hop_keys, &final_routing)?;

	let mut k_tilde = PayloadKey::default();
	rng.fill_bytes(&mut k_tilde);
	let mut keys = Vec::with_capacity(1 + hs.secrets.len());
	keys.push(k_tilde);
	keys.extend(hs.secrets.iter().map(crypto::derive_payload_key));

	Ok(SingleUseReplyBlock {
		id,
		keys,
		nym: NymTuple { first_hop: path[0].id, header: hs.header, k_tilde },
	})
}

/// Wrap a reply message into the payload for a SURB packet. Run by the replier, who only holds
/// the [`NymTuple`]; the matching header goes out unchanged next to this delta.
pub fn package_surb(
	params: &SphinxParams,
	nym: &NymTuple,
	message: &[u8],
) -> Result<Vec<u8>, SphinxError> {
	let mut plain = vec![0; KEY_SIZE];
	plain.extend_from_slice(message);
	let mut delta = pad_body(params.body_len(), &plain)?;
	crypto::sprp_encrypt(&nym.k_tilde, &mut delta);
	Ok(delta)
}

/// Decrypt a reply payload delivered for a SURB. `keys` is the stored key vector of the matching
/// [`SingleUseReplyBlock`]; `delta` is the payload as it arrived at the last return hop.
///
/// Each return hop applied its SPRP in the encrypt direction on top of the replier's layer, so
/// the unwind re-encrypts under the hop keys in reverse before undoing the replier's layer.
pub fn receive_surb(keys: &[PayloadKey], delta: &mut Vec<u8>) -> Result<Vec<u8>, SphinxError> {
	assert!(keys.len() >= 2, "a SURB key vector holds k_tilde and at least one hop key");
	for key in keys[1..].iter().rev() {
		crypto::sprp_encrypt(key, delta);
	}
	crypto::sprp_decrypt(&keys[0], delta);
	if delta.len() < KEY_SIZE {
		return Err(SphinxError::BadLength { expected: KEY_SIZE, got: delta.len() })
	}
	if !bool::from(delta[..KEY_SIZE].ct_eq(&[0; KEY_SIZE])) {
		return Err(SphinxError::MacMismatch)
	}
	unpad_body(&delta[KEY_SIZE..])
}

/// Capacity-bounded store of outstanding SURB key vectors, indexed by SURB id. Oldest entries
/// are evicted first; redeeming an entry removes it, making replay of a reply impossible.
pub struct SurbKeystore {
	capacity: usize,
	entries: LinkedHashMap<SurbId, Vec<PayloadKey>>,
}

impl SurbKeystore {
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0);
		Self { capacity, entries: LinkedHashMap::with_capacity(capacity) }
	}

	/// Number of outstanding entries.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Remember the keys of a freshly created SURB, evicting the oldest entry if full.
	pub fn insert(&mut self, id: &SurbId, keys: Vec<PayloadKey>) {
		match self.entries.entry(*id) {
			Entry::Occupied(_) => debug!(target: "sphinx", "Duplicate SURB id; ignoring"),
			Entry::Vacant(entry) => {
				entry.insert(keys);
				if self.entries.len() > self.capacity {
					debug!(target: "sphinx", "SURB keystore full; evicting oldest entry");
					self.entries.pop_front();
				}
			},
		}
	}

	/// Remove and return the key vector for `id`. Returns `None` for unknown (or already
	/// redeemed, or evicted) ids.
	pub fn redeem(&mut self, id: &SurbId) -> Option<Vec<PayloadKey>> {
		self.entries.remove(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::KeyPair;
	use rand::rngs::OsRng;

	fn path(nu: usize) -> Vec<PathHop> {
		(0..nu)
			.map(|i| {
				PathHop {
					id: i as MixnodeIndex,
					delay_ms: 100,
					public_key: *KeyPair::gen(&mut OsRng).public(),
				}
			})
			.collect()
	}

	#[test]
	fn keystore_redeems_once() {
		let mut store = SurbKeystore::new(4);
		let id = [1; crate::wire::SURB_ID_SIZE];
		store.insert(&id, vec![[2; KEY_SIZE], [3; KEY_SIZE]]);
		assert_eq!(store.len(), 1);
		assert!(store.redeem(&id).is_some());
		assert!(store.redeem(&id).is_none());
	}

	#[test]
	fn keystore_evicts_oldest() {
		let mut store = SurbKeystore::new(2);
		for i in 0..3u8 {
			store.insert(&[i; crate::wire::SURB_ID_SIZE], vec![[i; KEY_SIZE]; 2]);
		}
		assert_eq!(store.len(), 2);
		assert!(store.redeem(&[0; crate::wire::SURB_ID_SIZE]).is_none());
		assert!(store.redeem(&[2; crate::wire::SURB_ID_SIZE]).is_some());
	}

	#[test]
	fn surb_keys_cover_every_hop() {
		let params = SphinxParams::default();
		let path = path(3);
		let surb = create_surb(&params, &mut OsRng, &path, b"alice").unwrap();
		assert_eq!(surb.keys.len(), 4);
		assert_eq!(surb.keys[0], surb.nym.k_tilde);
		assert_eq!(surb.nym.first_hop, 0);
	}

	#[test]
	fn tampered_reply_rejected() {
		let params = SphinxParams::default();
		let path = path(1);
		let surb = create_surb(&params, &mut OsRng, &path, b"alice").unwrap();
		let mut delta = package_surb(&params, &surb.nym, b"reply").unwrap();
		// One flipped ciphertext bit scrambles the whole block under the wide cipher, so the
		// zero prefix check must fail.
		delta[100] ^= 1;
		crypto::sprp_decrypt(&surb.keys[1], &mut delta);
		assert_eq!(receive_surb(&surb.keys, &mut delta), Err(SphinxError::MacMismatch));
	}
}
