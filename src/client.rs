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

//! Sender-side operations: build forward packets and open payloads at the exit.

use crate::{
	crypto::{self, HopSecret, PayloadKey, KEY_SIZE, MAC_SIZE},
	error::SphinxError,
	header::{create_header, PacketContent},
	padding::{pad_body, unpad_body},
	params::SphinxParams,
	wire::{MixnodeIndex, RoutingInstruction},
};
use curve25519_dalek::ristretto::RistrettoPoint;
use rand::{CryptoRng, Rng};

/// Longest destination identifier a payload can carry.
pub const MAX_DEST_SIZE: usize = 127;

/// One hop of a forward route, as drawn from a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHop {
	pub id: MixnodeIndex,
	/// Forwarding delay this hop is asked to apply, in milliseconds.
	pub delay_ms: u32,
	pub public_key: RistrettoPoint,
}

/// What the exit hop recovers from a forward payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAndMessage {
	pub destination: Vec<u8>,
	pub message: Vec<u8>,
}

/// Largest message that fits a forward payload addressed to a `dest_len`-byte destination. The
/// payload gives up an integrity tag, a padding marker and the destination length byte.
pub fn max_payload_size(params: &SphinxParams, dest_len: usize) -> usize {
	params.body_len() - KEY_SIZE - 2 - dest_len
}

/// Build a complete forward packet for `message` to `destination` through `path`.
///
/// The first hop of `path` is the node the packet must be handed to; it is not encoded inside
/// the header.
pub fn create_forward_message(
	params: &SphinxParams,
	rng: &mut (impl Rng + CryptoRng),
	path: &[PathHop],
	destination: &[u8],
	message: &[u8],
) -> Result<PacketContent, SphinxError> {
	assert!(!path.is_empty(), "a route needs at least one hop");
	if destination.len() > MAX_DEST_SIZE {
		return Err(SphinxError::InsufficientCapacity {
			needed: destination.len(),
			available: MAX_DEST_SIZE,
		})
	}
	if message.len() > max_payload_size(params, destination.len()) {
		return Err(SphinxError::InsufficientCapacity {
			needed: message.len(),
			available: max_payload_size(params, destination.len()),
		})
	}

	// Hop i reads the instruction for hop i + 1; the last hop reads the exit instruction.
	let hop_meta: Vec<Vec<u8>> = path
		.iter()
		.map(|hop| RoutingInstruction::Relay { id: hop.id, delay_ms: hop.delay_ms }.encode())
		.collect();
	let hop_keys: Vec<RistrettoPoint> = path.iter().map(|hop| hop.public_key).collect();
	let hs = create_header(
		params,
		rng,
		&hop_meta,
		&hop_keys,
		&RoutingInstruction::Destination.encode(),
	)?;

	let mut plain = Vec::with_capacity(1 + destination.len() + message.len());
	plain.push(destination.len() as u8);
	plain.extend_from_slice(destination);
	plain.extend_from_slice(message);
	let delta = wrap_payload(params, &hs.secrets, &plain)?;

	Ok(PacketContent { header: hs.header, delta })
}

/// Pad `plain`, tag it under the exit hop's payload key and onion-encrypt it for every hop.
pub(crate) fn wrap_payload(
	params: &SphinxParams,
	secrets: &[HopSecret],
	plain: &[u8],
) -> Result<Vec<u8>, SphinxError> {
	let padded = pad_body(params.body_len() - MAC_SIZE, plain)?;
	let exit_key = crypto::derive_payload_key(&secrets[secrets.len() - 1]);
	let mut delta = Vec::with_capacity(params.body_len());
	delta.extend_from_slice(&crypto::compute_mac(&exit_key, &padded));
	delta.extend_from_slice(&padded);
	for secret in secrets.iter().rev() {
		crypto::sprp_encrypt(&crypto::derive_payload_key(secret), &mut delta);
	}
	Ok(delta)
}

/// Open a fully peeled forward payload at the exit hop. `payload_key` comes from processing the
/// packet at the exit; the integrity tag is checked in constant time before the contents are
/// parsed.
pub fn receive_forward(
	payload_key: &PayloadKey,
	delta: &[u8],
) -> Result<DestinationAndMessage, SphinxError> {
	if delta.len() < MAC_SIZE + 1 {
		return Err(SphinxError::BadLength { expected: MAC_SIZE + 1, got: delta.len() })
	}
	let (tag, padded) = delta.split_at(MAC_SIZE);
	if !crypto::mac_ok(arrayref::array_ref![tag, 0, MAC_SIZE], payload_key, padded) {
		return Err(SphinxError::MacMismatch)
	}
	let plain = unpad_body(padded)?;
	if plain.is_empty() {
		return Err(SphinxError::BadLength { expected: 1, got: 0 })
	}
	let dest_len = plain[0] as usize;
	if 1 + dest_len > plain.len() {
		return Err(SphinxError::BadLength { expected: 1 + dest_len, got: plain.len() })
	}
	Ok(DestinationAndMessage {
		destination: plain[1..1 + dest_len].to_vec(),
		message: plain[1 + dest_len..].to_vec(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::KeyPair;
	use rand::rngs::OsRng;

	#[test]
	fn oversized_message_rejected() {
		let params = SphinxParams::default();
		let node = KeyPair::gen(&mut OsRng);
		let path = [PathHop { id: 0, delay_ms: 0, public_key: *node.public() }];
		let dest = b"bob";
		let limit = max_payload_size(&params, dest.len());
		let err = create_forward_message(&params, &mut OsRng, &path, dest, &vec![0; limit + 1])
			.unwrap_err();
		assert!(matches!(err, SphinxError::InsufficientCapacity { .. }));
		assert!(
			create_forward_message(&params, &mut OsRng, &path, dest, &vec![0; limit]).is_ok()
		);
	}

	#[test]
	fn oversized_destination_rejected() {
		let params = SphinxParams::default();
		let node = KeyPair::gen(&mut OsRng);
		let path = [PathHop { id: 0, delay_ms: 0, public_key: *node.public() }];
		let err = create_forward_message(&params, &mut OsRng, &path, &[0; MAX_DEST_SIZE + 1], b"")
			.unwrap_err();
		assert!(matches!(err, SphinxError::InsufficientCapacity { .. }));
	}

	#[test]
	fn delta_is_body_sized() {
		let params = SphinxParams::default();
		let node = KeyPair::gen(&mut OsRng);
		let path = [PathHop { id: 0, delay_ms: 0, public_key: *node.public() }];
		let content =
			create_forward_message(&params, &mut OsRng, &path, b"bob", b"hello").unwrap();
		assert_eq!(content.delta.len(), params.body_len());
		assert_eq!(content.header.beta.len(), params.beta_len());
	}
}
