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

//! Mixnode packet processing: peel one onion layer.

use crate::{
	crypto::{self, Mac, PayloadKey, ReplayTag, MAC_SIZE},
	error::SphinxError,
	header::{Header, PacketContent},
	params::SphinxParams,
	wire::RoutingInstruction,
};
use arrayref::array_ref;
use curve25519_dalek::scalar::Scalar;

/// Result of peeling one layer off a packet.
#[derive(Debug)]
pub struct ProcessedPacket {
	/// Tag for replay detection. Deterministic per (node key, packet); a node must drop packets
	/// whose tag it has seen before.
	pub replay_tag: ReplayTag,
	/// This hop's instruction, recovered from the front of beta.
	pub routing: RoutingInstruction,
	/// The packet for the next hop. Meaningful as a packet only when `routing` is
	/// [`RoutingInstruction::Relay`]; for exit instructions only `delta` is of interest.
	pub content: PacketContent,
	/// Key for checking the payload integrity tag when this hop is the exit.
	pub payload_key: PayloadKey,
}

/// Process an incoming packet at a node holding `secret`: verify the header MAC, extract this
/// hop's routing instruction, and transform the packet for the next hop.
///
/// The MAC is checked (in constant time) before anything else is looked at; a packet that fails
/// verification leaks nothing about its contents.
pub fn process_packet(
	params: &SphinxParams,
	secret: &Scalar,
	content: PacketContent,
) -> Result<ProcessedPacket, SphinxError> {
	let beta_len = params.beta_len();
	let body_len = params.body_len();
	let PacketContent { header: Header { alpha, beta, gamma }, mut delta } = content;
	if beta.len() != beta_len {
		return Err(SphinxError::BadLength { expected: beta_len, got: beta.len() })
	}
	if delta.len() != body_len {
		return Err(SphinxError::BadLength { expected: body_len, got: delta.len() })
	}

	let s = crypto::exponentiate(&alpha, secret);
	let hop_secret = crypto::derive_hop_secret(&s);

	if !crypto::mac_ok(&gamma, &crypto::derive_mac_key(&hop_secret), &beta) {
		return Err(SphinxError::MacMismatch)
	}

	// Decrypt beta with enough zero extension appended that the next hop's beta is full length
	// again after this hop's slice is consumed.
	let mut b = beta;
	b.resize(beta_len + MAC_SIZE + u8::MAX as usize + 1, 0);
	crypto::apply_keystream(&crypto::derive_stream_key(&hop_secret), &mut b);

	let meta_len = b[0] as usize;
	if 1 + meta_len + MAC_SIZE > b.len() {
		return Err(SphinxError::BadLength { expected: 1 + meta_len + MAC_SIZE, got: b.len() })
	}
	let routing = RoutingInstruction::decode(&b[1..1 + meta_len])?;
	let rest = &b[1 + meta_len..];

	let blind = crypto::derive_blinding_factor(&alpha, &hop_secret);
	let next_alpha = crypto::exponentiate(&alpha, &blind);
	let next_gamma: Mac = *array_ref![rest, 0, MAC_SIZE];
	let next_beta = rest[MAC_SIZE..MAC_SIZE + beta_len].to_vec();

	let payload_key = crypto::derive_payload_key(&hop_secret);
	crypto::sprp_decrypt(&payload_key, &mut delta);

	Ok(ProcessedPacket {
		replay_tag: crypto::derive_replay_tag(&hop_secret),
		routing,
		content: PacketContent {
			header: Header { alpha: next_alpha, beta: next_beta, gamma: next_gamma },
			delta,
		},
		payload_key,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{crypto::KeyPair, header::create_header};
	use rand::rngs::OsRng;

	#[test]
	fn wrong_node_key_rejected() {
		let params = SphinxParams::default();
		let intended = KeyPair::gen(&mut OsRng);
		let other = KeyPair::gen(&mut OsRng);
		let hs = create_header(
			&params,
			&mut OsRng,
			&[vec![0; 9]],
			&[*intended.public()],
			&RoutingInstruction::Destination.encode(),
		)
		.unwrap();
		let content = PacketContent { header: hs.header, delta: vec![0; params.body_len()] };
		assert_eq!(
			process_packet(&params, other.secret(), content).unwrap_err(),
			SphinxError::MacMismatch
		);
	}

	#[test]
	fn bad_beta_length_rejected() {
		let params = SphinxParams::default();
		let node = KeyPair::gen(&mut OsRng);
		let hs = create_header(
			&params,
			&mut OsRng,
			&[vec![0; 9]],
			&[*node.public()],
			&RoutingInstruction::Destination.encode(),
		)
		.unwrap();
		let mut content = PacketContent { header: hs.header, delta: vec![0; params.body_len()] };
		content.header.beta.pop();
		assert!(matches!(
			process_packet(&params, node.secret(), content),
			Err(SphinxError::BadLength { .. })
		));
	}

	#[test]
	fn replay_tag_is_deterministic() {
		let params = SphinxParams::default();
		let node = KeyPair::gen(&mut OsRng);
		let hs = create_header(
			&params,
			&mut OsRng,
			&[vec![0; 9]],
			&[*node.public()],
			&RoutingInstruction::Destination.encode(),
		)
		.unwrap();
		let content = PacketContent { header: hs.header, delta: vec![0; params.body_len()] };
		let a = process_packet(&params, node.secret(), content.clone()).unwrap();
		let b = process_packet(&params, node.secret(), content).unwrap();
		assert_eq!(a.replay_tag, b.replay_tag);
	}
}
