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

//! Onion header construction.
//!
//! The header is built in reverse: the per-hop secrets are derived front to back by repeatedly
//! blinding a single ephemeral exponent, the "filler" is accumulated front to back, and the
//! routing block (beta) plus its MAC chain are then assembled back to front so that peeling one
//! layer at a relay reveals exactly the next layer.

use crate::{
	crypto::{self, HopSecret, Mac, MAC_SIZE},
	error::SphinxError,
	params::SphinxParams,
};
use curve25519_dalek::ristretto::RistrettoPoint;
use rand::{CryptoRng, Rng};

/// The onion header: `(alpha, beta, gamma)`. Beta is always exactly
/// [`beta_len`](SphinxParams::beta_len) bytes, at every hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
	/// Blinded ephemeral group element for the key exchange with the current hop.
	pub alpha: RistrettoPoint,
	/// Onion-encrypted routing information.
	pub beta: Vec<u8>,
	/// Truncated MAC over beta under the current hop's MAC key.
	pub gamma: Mac,
}

/// A header together with the payload it routes. This is what travels between nodes (modulo the
/// wire framing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketContent {
	pub header: Header,
	/// Onion-encrypted payload, always exactly [`body_len`](SphinxParams::body_len) bytes.
	pub delta: Vec<u8>,
}

/// Output of [`create_header`]: the assembled header and the per-hop secrets the sender needs to
/// wrap the payload. Never persisted.
pub struct HeaderAndSecrets {
	pub header: Header,
	/// One secret per hop, in route order.
	pub secrets: Vec<HopSecret>,
}

/// Build an onion header routing through `hop_meta`/`hop_keys` and ending with `final_routing`.
///
/// `hop_meta[i]` is the opaque routing metadata blob identifying hop `i`; the blob for hop `i+1`
/// is what relay `i` reads as its forwarding instruction, so `hop_meta[0]` never appears inside
/// beta (the sender contacts the first hop directly). `final_routing` is the instruction the
/// last hop reads.
pub fn create_header(
	params: &SphinxParams,
	rng: &mut (impl Rng + CryptoRng),
	hop_meta: &[Vec<u8>],
	hop_keys: &[RistrettoPoint],
	final_routing: &[u8],
) -> Result<HeaderAndSecrets, SphinxError> {
	assert_eq!(hop_meta.len(), hop_keys.len());
	assert!(!hop_keys.is_empty(), "a route needs at least one hop");
	let nu = hop_keys.len();
	let beta_len = params.beta_len();

	// Length-prefix each metadata blob; the prefix is the byte a relay reads first after
	// decrypting its slice of beta.
	let mut meta = Vec::with_capacity(nu);
	for blob in hop_meta {
		if blob.len() > u8::MAX as usize {
			return Err(SphinxError::InsufficientCapacity {
				needed: blob.len(),
				available: u8::MAX as usize,
			})
		}
		let mut prefixed = Vec::with_capacity(1 + blob.len());
		prefixed.push(blob.len() as u8);
		prefixed.extend_from_slice(blob);
		meta.push(prefixed);
	}
	if final_routing.len() > u8::MAX as usize {
		return Err(SphinxError::InsufficientCapacity {
			needed: final_routing.len(),
			available: u8::MAX as usize,
		})
	}

	// Derive the per-hop key material by accumulating blinding factors into a single running
	// exponent.
	let mut blind = crypto::gen_secret(rng);
	let mut alphas = Vec::with_capacity(nu);
	let mut secrets: Vec<HopSecret> = Vec::with_capacity(nu);
	for key in hop_keys {
		let alpha = crypto::derive_public(&blind);
		let s = crypto::exponentiate(key, &blind);
		let secret = crypto::derive_hop_secret(&s);
		blind *= crypto::derive_blinding_factor(&alpha, &secret);
		alphas.push(alpha);
		secrets.push(secret);
	}

	let len_meta: usize = meta[1..].iter().map(Vec::len).sum();
	let used = len_meta + (nu - 1) * MAC_SIZE + 1 + final_routing.len();
	if used > beta_len {
		return Err(SphinxError::InsufficientCapacity { needed: used, available: beta_len })
	}

	// Build the filler. After hop i peels its layer, the tail of its output beta is keystream it
	// appended itself; the filler reproduces exactly those bytes so the innermost beta can be
	// constructed to match what each relay will actually see.
	let mut phi: Vec<u8> = Vec::new();
	let mut window = beta_len;
	for i in 1..nu {
		let grow = MAC_SIZE + meta[i].len();
		let mut buf = vec![0; window];
		buf.extend_from_slice(&phi);
		buf.resize(window + phi.len() + grow, 0);
		crypto::apply_keystream(&crypto::derive_stream_key(&secrets[i - 1]), &mut buf);
		phi = buf.split_off(window);
		window -= grow;
	}
	debug_assert_eq!(phi.len(), len_meta + (nu - 1) * MAC_SIZE);

	// Innermost beta: the final routing instruction, random padding out to the per-hop window,
	// then the filler.
	let mut beta = Vec::with_capacity(beta_len);
	beta.push(final_routing.len() as u8);
	beta.extend_from_slice(final_routing);
	let mut random_pad = vec![0; beta_len - len_meta - (nu - 1) * MAC_SIZE - beta.len()];
	rng.fill_bytes(&mut random_pad);
	beta.extend_from_slice(&random_pad);
	crypto::apply_keystream(&crypto::derive_stream_key(&secrets[nu - 1]), &mut beta);
	beta.extend_from_slice(&phi);
	debug_assert_eq!(beta.len(), beta_len);
	let mut gamma = crypto::compute_mac(&crypto::derive_mac_key(&secrets[nu - 1]), &beta);

	// Wrap the remaining layers back to front. Each layer starts with the next hop's metadata
	// and MAC; the truncated tail of the inner beta is reproduced by the filler at peel time.
	for i in (0..nu - 1).rev() {
		let keep = beta_len - MAC_SIZE - meta[i + 1].len();
		let mut plain = Vec::with_capacity(beta_len);
		plain.extend_from_slice(&meta[i + 1]);
		plain.extend_from_slice(&gamma);
		plain.extend_from_slice(&beta[..keep]);
		crypto::apply_keystream(&crypto::derive_stream_key(&secrets[i]), &mut plain);
		beta = plain;
		gamma = crypto::compute_mac(&crypto::derive_mac_key(&secrets[i]), &beta);
	}

	Ok(HeaderAndSecrets { header: Header { alpha: alphas[0], beta, gamma }, secrets })
}
