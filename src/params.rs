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

//! System parameters shared by all packet operations.

use crate::{
	crypto::{GROUP_ELEMENT_SIZE, KEY_SIZE, MAC_SIZE},
	error::SphinxError,
};

/// Default header length in bytes, enough for a 5-hop route.
pub const DEFAULT_HEADER_LEN: usize = 192;
/// Default body (payload) length in bytes.
pub const DEFAULT_BODY_LEN: usize = 1024;

/// Bytes of the header budget not available to beta: the encoded alpha group element plus the
/// truncated header MAC (gamma).
pub const HEADER_OVERHEAD: usize = GROUP_ELEMENT_SIZE + MAC_SIZE;

/// Smallest body length the payload SPRP can permute without degenerating.
const MIN_BODY_LEN: usize = 128;

/// Immutable Sphinx system parameters. Every party of a deployment must use the same values;
/// packets built under one parameter set cannot be processed under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SphinxParams {
	header_len: usize,
	body_len: usize,
}

impl SphinxParams {
	/// Create a parameter set. Panics if `header_len` leaves no room for routing information or
	/// `body_len` is too small for the payload cipher; parameter sets are fixed deployment
	/// constants, not untrusted input.
	pub fn new(header_len: usize, body_len: usize) -> Self {
		Self::try_new(header_len, body_len).expect("invalid Sphinx parameter lengths")
	}

	/// Fallible variant of [`new`](Self::new), for lengths read off the wire.
	pub fn try_new(header_len: usize, body_len: usize) -> Result<Self, SphinxError> {
		if header_len <= HEADER_OVERHEAD + KEY_SIZE {
			return Err(SphinxError::BadLength {
				expected: HEADER_OVERHEAD + KEY_SIZE + 1,
				got: header_len,
			})
		}
		if body_len < MIN_BODY_LEN {
			return Err(SphinxError::BadLength { expected: MIN_BODY_LEN, got: body_len })
		}
		Ok(Self { header_len, body_len })
	}

	/// Total header length in bytes.
	pub fn header_len(&self) -> usize {
		self.header_len
	}

	/// Fixed payload length in bytes. Delta is exactly this size at every hop.
	pub fn body_len(&self) -> usize {
		self.body_len
	}

	/// Symmetric key and truncated MAC size. Fixed by the primitives.
	pub fn key_len(&self) -> usize {
		KEY_SIZE
	}

	/// Length of the routing information block (beta). Invariant at every hop.
	pub fn beta_len(&self) -> usize {
		self.header_len - HEADER_OVERHEAD
	}
}

impl Default for SphinxParams {
	fn default() -> Self {
		Self::new(DEFAULT_HEADER_LEN, DEFAULT_BODY_LEN)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_lengths() {
		let params = SphinxParams::default();
		assert_eq!(params.header_len(), 192);
		assert_eq!(params.body_len(), 1024);
		assert_eq!(params.key_len(), 16);
		assert_eq!(params.beta_len(), 144);
	}

	#[test]
	#[should_panic]
	fn rejects_degenerate_header() {
		SphinxParams::new(HEADER_OVERHEAD, DEFAULT_BODY_LEN);
	}
}
