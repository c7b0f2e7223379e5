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

//! Binary wire encoding: routing instructions carried inside beta, and the packet framing sent
//! between nodes.

use crate::{
	crypto::{decode_point, encode_point, Mac, GROUP_ELEMENT_SIZE, KEY_SIZE, MAC_SIZE},
	error::SphinxError,
	header::{Header, PacketContent},
	params::SphinxParams,
};
use arrayref::array_ref;

/// Identifier of a mixnode within a directory.
pub type MixnodeIndex = u32;

/// Size in bytes of a [`SurbId`].
pub const SURB_ID_SIZE: usize = KEY_SIZE;
/// Identifier tying an incoming reply to a previously handed-out reply block.
pub type SurbId = [u8; SURB_ID_SIZE];

/// Identifies the group of the encoded alpha point on the wire.
pub const RISTRETTO_GROUP_ID: u8 = 0x01;

const FLAG_DESTINATION: u8 = 0xf0;
const FLAG_RELAY: u8 = 0xf1;
const FLAG_SURB: u8 = 0xf2;

/// One hop's routing instruction, recovered from beta when the layer is peeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingInstruction {
	/// Forward the packet to another mixnode, ideally after `delay_ms` milliseconds.
	Relay { id: MixnodeIndex, delay_ms: u32 },
	/// This hop is the exit; the payload carries the destination and message.
	Destination,
	/// This hop is the exit and the payload is a reply addressed to a single-use reply block.
	Surb { destination: Vec<u8>, surb_id: SurbId },
}

impl RoutingInstruction {
	pub fn encode(&self) -> Vec<u8> {
		match self {
			RoutingInstruction::Destination => vec![FLAG_DESTINATION],
			RoutingInstruction::Relay { id, delay_ms } => {
				let mut out = Vec::with_capacity(9);
				out.push(FLAG_RELAY);
				out.extend_from_slice(&id.to_be_bytes());
				out.extend_from_slice(&delay_ms.to_be_bytes());
				out
			},
			RoutingInstruction::Surb { destination, surb_id } => {
				debug_assert!(destination.len() <= u8::MAX as usize);
				let mut out = Vec::with_capacity(2 + destination.len() + SURB_ID_SIZE);
				out.push(FLAG_SURB);
				out.push(destination.len() as u8);
				out.extend_from_slice(destination);
				out.extend_from_slice(surb_id);
				out
			},
		}
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, SphinxError> {
		let mut r = Reader::new(bytes);
		let instruction = match r.take_u8()? {
			FLAG_DESTINATION => RoutingInstruction::Destination,
			FLAG_RELAY => {
				let id = r.take_u32()?;
				let delay_ms = r.take_u32()?;
				RoutingInstruction::Relay { id, delay_ms }
			},
			FLAG_SURB => {
				let dest_len = r.take_u8()? as usize;
				let destination = r.take(dest_len)?.to_vec();
				let surb_id = *array_ref![r.take(SURB_ID_SIZE)?, 0, SURB_ID_SIZE];
				RoutingInstruction::Surb { destination, surb_id }
			},
			flag => return Err(SphinxError::UnknownRoutingFlag(flag)),
		};
		r.finish()?;
		Ok(instruction)
	}
}

/// A packet together with the parameter lengths it was built under, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SphinxPacket {
	pub params: SphinxParams,
	pub content: PacketContent,
}

/// Serialize a packet into its wire form.
///
/// Field order: parameter lengths, group id, alpha, beta, gamma, delta.
pub fn pack_message(params: &SphinxParams, content: &PacketContent) -> Vec<u8> {
	let header = &content.header;
	let mut out = Vec::with_capacity(
		4 + 4 + 1 + GROUP_ELEMENT_SIZE + 2 + header.beta.len() + MAC_SIZE + 4 +
			content.delta.len(),
	);
	out.extend_from_slice(&(params.header_len() as u32).to_be_bytes());
	out.extend_from_slice(&(params.body_len() as u32).to_be_bytes());
	out.push(RISTRETTO_GROUP_ID);
	out.extend_from_slice(&encode_point(&header.alpha));
	out.extend_from_slice(&(header.beta.len() as u16).to_be_bytes());
	out.extend_from_slice(&header.beta);
	out.extend_from_slice(&header.gamma);
	out.extend_from_slice(&(content.delta.len() as u32).to_be_bytes());
	out.extend_from_slice(&content.delta);
	out
}

/// Inverse of [`pack_message`]. Validates that the field lengths are consistent with the encoded
/// parameter lengths.
pub fn unpack_message(bytes: &[u8]) -> Result<SphinxPacket, SphinxError> {
	let mut r = Reader::new(bytes);
	let header_len = r.take_u32()? as usize;
	let body_len = r.take_u32()? as usize;
	let params = SphinxParams::try_new(header_len, body_len)?;
	if r.take_u8()? != RISTRETTO_GROUP_ID {
		return Err(SphinxError::InvalidGroupElement)
	}
	let alpha = decode_point(r.take(GROUP_ELEMENT_SIZE)?)?;
	let beta_len = r.take_u16()? as usize;
	if beta_len != params.beta_len() {
		return Err(SphinxError::BadLength { expected: params.beta_len(), got: beta_len })
	}
	let beta = r.take(beta_len)?.to_vec();
	let gamma: Mac = *array_ref![r.take(MAC_SIZE)?, 0, MAC_SIZE];
	let delta_len = r.take_u32()? as usize;
	if delta_len != body_len {
		return Err(SphinxError::BadLength { expected: body_len, got: delta_len })
	}
	let delta = r.take(delta_len)?.to_vec();
	r.finish()?;
	Ok(SphinxPacket {
		params,
		content: PacketContent { header: Header { alpha, beta, gamma }, delta },
	})
}

struct Reader<'a> {
	buf: &'a [u8],
}

impl<'a> Reader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Self { buf }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8], SphinxError> {
		if self.buf.len() < n {
			return Err(SphinxError::BadLength { expected: n, got: self.buf.len() })
		}
		let (taken, rest) = self.buf.split_at(n);
		self.buf = rest;
		Ok(taken)
	}

	fn take_u8(&mut self) -> Result<u8, SphinxError> {
		Ok(self.take(1)?[0])
	}

	fn take_u16(&mut self) -> Result<u16, SphinxError> {
		Ok(u16::from_be_bytes(*array_ref![self.take(2)?, 0, 2]))
	}

	fn take_u32(&mut self) -> Result<u32, SphinxError> {
		Ok(u32::from_be_bytes(*array_ref![self.take(4)?, 0, 4]))
	}

	/// All fields consumed; trailing garbage is an error.
	fn finish(self) -> Result<(), SphinxError> {
		if self.buf.is_empty() {
			Ok(())
		} else {
			Err(SphinxError::BadLength { expected: 0, got: self.buf.len() })
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn routing_instruction_round_trips() {
		let instructions = [
			RoutingInstruction::Destination,
			RoutingInstruction::Relay { id: 42, delay_ms: 1250 },
			RoutingInstruction::Surb { destination: b"bob".to_vec(), surb_id: [7; SURB_ID_SIZE] },
		];
		for instruction in instructions {
			let encoded = instruction.encode();
			assert!(encoded.len() <= u8::MAX as usize);
			assert_eq!(RoutingInstruction::decode(&encoded).unwrap(), instruction);
		}
	}

	#[test]
	fn unknown_flag_rejected() {
		assert_eq!(
			RoutingInstruction::decode(&[0xf7]),
			Err(SphinxError::UnknownRoutingFlag(0xf7))
		);
	}

	#[test]
	fn truncated_instruction_rejected() {
		let mut encoded = RoutingInstruction::Relay { id: 1, delay_ms: 2 }.encode();
		encoded.truncate(5);
		assert!(matches!(
			RoutingInstruction::decode(&encoded),
			Err(SphinxError::BadLength { .. })
		));
	}

	#[test]
	fn trailing_bytes_rejected() {
		let mut encoded = RoutingInstruction::Destination.encode();
		encoded.push(0);
		assert!(matches!(
			RoutingInstruction::decode(&encoded),
			Err(SphinxError::BadLength { .. })
		));
	}
}
