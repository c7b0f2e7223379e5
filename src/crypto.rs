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

//! Group operations, per-hop secret derivation, MAC computation, the beta stream cipher, and the
//! payload SPRP.

use crate::error::SphinxError;
use arrayref::array_ref;
use blake2::{
	digest::{
		consts::{U16, U32, U64},
		generic_array::GenericArray,
		FixedOutput, Mac as DigestMac,
	},
	Blake2b512, Blake2bMac, Digest,
};
use c2_chacha::{
	stream_cipher::{NewStreamCipher, SyncStreamCipher},
	ChaCha20,
};
use curve25519_dalek::{
	constants::RISTRETTO_BASEPOINT_TABLE,
	ristretto::{CompressedRistretto, RistrettoPoint},
	scalar::Scalar,
};
use lioness::LionessDefault;
use rand::{CryptoRng, Rng};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

// The per-purpose derivation constants ("flavors"). Changing any of these changes every key
// derived for that purpose across the whole system; senders and relays must agree on them.
const HOP_SECRET_PERSONAL: &[u8; 16] = b"sphinx-hop-secrt";
const BLINDING_FACTOR_PERSONAL: &[u8; 16] = b"sphinx-blind-fac";
const STREAM_KEY_PERSONAL: &[u8; 16] = b"sphinx-beta-strm";
const MAC_KEY_PERSONAL: &[u8; 16] = b"sphinx-beta-mac-";
const PAYLOAD_KEY_PERSONAL: &[u8; 16] = b"sphinx-payload-k";
const REPLAY_TAG_PERSONAL: &[u8; 16] = b"sphinx-replay-tg";
const SPRP_KEY_PERSONAL: &[u8; 16] = b"sphinx-sprp-expd";

/// Size in bytes of the symmetric subkeys and of the truncated MACs.
pub const KEY_SIZE: usize = 16;
/// Size in bytes of a [`Mac`] (gamma and the payload MAC). Truncated; see the packet format notes
/// in the crate documentation.
pub const MAC_SIZE: usize = KEY_SIZE;
/// Size in bytes of a canonically encoded group element.
pub const GROUP_ELEMENT_SIZE: usize = 32;

/// Per-hop shared secret, derived from the Diffie-Hellman result. Everything else a hop needs is
/// derived from this; it never outlives the processing of one packet.
pub type HopSecret = [u8; KEY_SIZE];
/// Truncated Blake2b MAC.
pub type Mac = [u8; MAC_SIZE];
/// Key for the beta MAC (the `hmu` subkey).
pub type MacKey = [u8; KEY_SIZE];
/// Key for the payload SPRP and the final payload MAC (the `hpi` subkey).
pub type PayloadKey = [u8; KEY_SIZE];
/// Per-hop replay tag (the `htau` subkey); relays cache these to drop duplicates.
pub type ReplayTag = [u8; KEY_SIZE];
/// Key for the beta stream cipher (the `hrho` subkey).
pub type StreamKey = [u8; 32];

////////////////////////////////////////////////////////////////////////////////
// Group operations
////////////////////////////////////////////////////////////////////////////////

/// Generate a secret exponent, uniform in the scalar field.
pub fn gen_secret(rng: &mut (impl Rng + CryptoRng)) -> Scalar {
	let mut wide = [0; 64];
	rng.fill_bytes(&mut wide);
	Scalar::from_bytes_mod_order_wide(&wide)
}

/// Derive the public group element corresponding to a secret exponent.
pub fn derive_public(secret: &Scalar) -> RistrettoPoint {
	RISTRETTO_BASEPOINT_TABLE * secret
}

/// Raise `element` to `scalar`.
pub fn exponentiate(element: &RistrettoPoint, scalar: &Scalar) -> RistrettoPoint {
	element * scalar
}

/// Raise `element` to the product of `scalars`, as if by sequential [`exponentiate`] calls.
pub fn multi_exponentiate(element: &RistrettoPoint, scalars: &[Scalar]) -> RistrettoPoint {
	let combined = scalars.iter().fold(Scalar::ONE, |acc, scalar| acc * scalar);
	element * &combined
}

/// Reduce an arbitrary-length byte string into the scalar field via a 64-byte digest.
pub fn scalar_from_hash(data: &[u8]) -> Scalar {
	let mut h = Blake2b512::new();
	h.update(data);
	let wide: [u8; 64] = h.finalize().into();
	Scalar::from_bytes_mod_order_wide(&wide)
}

/// Canonical (compressed) encoding of a group element.
pub fn encode_point(element: &RistrettoPoint) -> [u8; GROUP_ELEMENT_SIZE] {
	element.compress().to_bytes()
}

/// Decode a canonically encoded group element.
pub fn decode_point(bytes: &[u8]) -> Result<RistrettoPoint, SphinxError> {
	if bytes.len() != GROUP_ELEMENT_SIZE {
		return Err(SphinxError::BadLength { expected: GROUP_ELEMENT_SIZE, got: bytes.len() })
	}
	CompressedRistretto(*array_ref![bytes, 0, GROUP_ELEMENT_SIZE])
		.decompress()
		.ok_or(SphinxError::InvalidGroupElement)
}

/// A node's key-exchange key pair.
pub struct KeyPair {
	/// Boxed to avoid leaving copies of the secret around in memory if the pair is moved.
	secret: Box<Zeroizing<Scalar>>,
	public: RistrettoPoint,
}

impl KeyPair {
	pub fn gen(rng: &mut (impl Rng + CryptoRng)) -> Self {
		gen_secret(rng).into()
	}

	pub fn public(&self) -> &RistrettoPoint {
		&self.public
	}

	pub fn secret(&self) -> &Scalar {
		&self.secret
	}
}

impl From<Scalar> for KeyPair {
	fn from(secret: Scalar) -> Self {
		let secret = Box::new(Zeroizing::new(secret));
		let public = derive_public(&secret);
		Self { secret, public }
	}
}

////////////////////////////////////////////////////////////////////////////////
// Secret derivation
////////////////////////////////////////////////////////////////////////////////

fn derive_16(key: &[u8], personal: &[u8; 16]) -> [u8; 16] {
	let h = Blake2bMac::<U16>::new_with_salt_and_personal(key, b"", personal)
		.expect("Key, salt, and personalisation sizes are fixed and small enough");
	h.finalize().into_bytes().into()
}

/// Derive the per-hop shared secret from the Diffie-Hellman result.
pub fn derive_hop_secret(s: &RistrettoPoint) -> HopSecret {
	derive_16(&encode_point(s), HOP_SECRET_PERSONAL)
}

/// Derive the blinding factor applied to alpha between this hop and the next.
pub fn derive_blinding_factor(alpha: &RistrettoPoint, secret: &HopSecret) -> Scalar {
	let mut key = [0; GROUP_ELEMENT_SIZE + KEY_SIZE];
	key[..GROUP_ELEMENT_SIZE].copy_from_slice(&encode_point(alpha));
	key[GROUP_ELEMENT_SIZE..].copy_from_slice(secret);
	let h = Blake2bMac::<U64>::new_with_salt_and_personal(&key, b"", BLINDING_FACTOR_PERSONAL)
		.expect("Key, salt, and personalisation sizes are fixed and small enough");
	let wide: [u8; 64] = h.finalize().into_bytes().into();
	Scalar::from_bytes_mod_order_wide(&wide)
}

/// Derive the beta stream cipher key.
pub fn derive_stream_key(secret: &HopSecret) -> StreamKey {
	let h = Blake2bMac::<U32>::new_with_salt_and_personal(secret, b"", STREAM_KEY_PERSONAL)
		.expect("Key, salt, and personalisation sizes are fixed and small enough");
	h.finalize().into_bytes().into()
}

/// Derive the beta MAC key.
pub fn derive_mac_key(secret: &HopSecret) -> MacKey {
	derive_16(secret, MAC_KEY_PERSONAL)
}

/// Derive the payload SPRP key.
pub fn derive_payload_key(secret: &HopSecret) -> PayloadKey {
	derive_16(secret, PAYLOAD_KEY_PERSONAL)
}

/// Derive the replay tag this packet presents to the hop.
pub fn derive_replay_tag(secret: &HopSecret) -> ReplayTag {
	derive_16(secret, REPLAY_TAG_PERSONAL)
}

////////////////////////////////////////////////////////////////////////////////
// MAC computation
////////////////////////////////////////////////////////////////////////////////

pub fn compute_mac(key: &MacKey, data: &[u8]) -> Mac {
	let mut h =
		Blake2bMac::<U16>::new_from_slice(key).expect("Key size is fixed and small enough");
	h.update(data);
	h.finalize().into_bytes().into()
}

/// Constant-time MAC verification.
pub fn mac_ok(mac: &Mac, key: &MacKey, data: &[u8]) -> bool {
	bool::from(compute_mac(key, data).ct_eq(mac))
}

////////////////////////////////////////////////////////////////////////////////
// Beta encryption
////////////////////////////////////////////////////////////////////////////////

/// XOR a ChaCha20 keystream into `data`. Every key is derived for a single use, so a zero nonce
/// is fine.
pub fn apply_keystream(key: &StreamKey, data: &mut [u8]) {
	let mut c = ChaCha20::new(key.into(), &[0; 8].into());
	c.apply_keystream(data);
}

////////////////////////////////////////////////////////////////////////////////
// Payload encryption
////////////////////////////////////////////////////////////////////////////////

fn expand_sprp_key(key: &PayloadKey) -> Zeroizing<[u8; lioness::RAW_KEY_SIZE]> {
	let mut raw = Zeroizing::new([0; lioness::RAW_KEY_SIZE]);
	for (i, chunk) in raw.chunks_mut(64).enumerate() {
		// This is the construction libsodium uses for crypto_kdf_derive_from_key; see
		// https://doc.libsodium.org/key_derivation/
		let h = Blake2bMac::<U64>::new_with_salt_and_personal(
			key,
			&i.to_le_bytes(),
			SPRP_KEY_PERSONAL,
		)
		.expect("Key, salt, and personalisation sizes are fixed and small enough");
		h.finalize_into(GenericArray::from_mut_slice(chunk));
	}
	raw
}

/// Encrypt a payload block in place under the wide-block SPRP. Length preserving; flipping one
/// bit of the input scrambles the whole output block. A plain stream cipher must never be
/// substituted here: bit-level malleability would let a relay forge structured payloads.
pub fn sprp_encrypt(key: &PayloadKey, block: &mut [u8]) {
	let raw = expand_sprp_key(key);
	let l = LionessDefault::new_raw(&raw);
	l.encrypt(block).expect("Parameter construction enforces a large enough block");
}

/// Inverse of [`sprp_encrypt`].
pub fn sprp_decrypt(key: &PayloadKey, block: &mut [u8]) {
	let raw = expand_sprp_key(key);
	let l = LionessDefault::new_raw(&raw);
	l.decrypt(block).expect("Parameter construction enforces a large enough block");
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::OsRng;

	#[test]
	fn point_encoding_round_trip() {
		let secret = gen_secret(&mut OsRng);
		let point = derive_public(&secret);
		assert_eq!(decode_point(&encode_point(&point)).unwrap(), point);
	}

	#[test]
	fn bad_point_encoding_rejected() {
		// Not every 32-byte string is a canonical encoding; 0xff.. is not.
		let bytes = [0xff; GROUP_ELEMENT_SIZE];
		assert_eq!(decode_point(&bytes), Err(SphinxError::InvalidGroupElement));
		assert_eq!(
			decode_point(&[0; 7]),
			Err(SphinxError::BadLength { expected: GROUP_ELEMENT_SIZE, got: 7 })
		);
	}

	#[test]
	fn multi_exponentiate_matches_sequential() {
		let base = derive_public(&gen_secret(&mut OsRng));
		let scalars = [gen_secret(&mut OsRng), gen_secret(&mut OsRng), gen_secret(&mut OsRng)];
		let mut sequential = base;
		for scalar in &scalars {
			sequential = exponentiate(&sequential, scalar);
		}
		assert_eq!(multi_exponentiate(&base, &scalars), sequential);
	}

	#[test]
	fn exchange_is_symmetric() {
		let ours = KeyPair::gen(&mut OsRng);
		let theirs = KeyPair::gen(&mut OsRng);
		let s0 = exponentiate(theirs.public(), ours.secret());
		let s1 = exponentiate(ours.public(), theirs.secret());
		assert_eq!(derive_hop_secret(&s0), derive_hop_secret(&s1));
	}

	#[test]
	fn subkeys_are_independent() {
		let secret = [7; KEY_SIZE];
		let stream = derive_stream_key(&secret);
		let mac = derive_mac_key(&secret);
		let payload = derive_payload_key(&secret);
		let tag = derive_replay_tag(&secret);
		assert_ne!(stream[..KEY_SIZE], mac[..]);
		assert_ne!(mac, payload);
		assert_ne!(payload, tag);
		assert_ne!(mac, tag);
		// And keyed by the secret, not just the purpose constant
		assert_ne!(derive_mac_key(&[8; KEY_SIZE]), mac);
	}

	#[test]
	fn mac_verification() {
		let key = [3; KEY_SIZE];
		let mac = compute_mac(&key, b"some data");
		assert!(mac_ok(&mac, &key, b"some data"));
		assert!(!mac_ok(&mac, &key, b"some dat0"));
		assert!(!mac_ok(&mac, &[4; KEY_SIZE], b"some data"));
	}

	#[test]
	fn keystream_involution() {
		let key = [9; 32];
		let original = vec![0x5a; 300];
		let mut data = original.clone();
		apply_keystream(&key, &mut data);
		assert_ne!(data, original);
		apply_keystream(&key, &mut data);
		assert_eq!(data, original);
	}

	#[test]
	fn sprp_round_trip() {
		let key = [1; KEY_SIZE];
		let original: Vec<u8> = (0..1024).map(|i| i as u8).collect();
		let mut block = original.clone();
		sprp_encrypt(&key, &mut block);
		assert_eq!(block.len(), original.len());
		assert_ne!(block, original);
		sprp_decrypt(&key, &mut block);
		assert_eq!(block, original);
	}

	#[test]
	fn sprp_avalanche() {
		// Flipping a single input bit must change the output block unpredictably, not locally.
		let key = [2; KEY_SIZE];
		let mut a = vec![0; 1024];
		let mut b = vec![0; 1024];
		b[1000] ^= 1;
		sprp_encrypt(&key, &mut a);
		sprp_encrypt(&key, &mut b);
		let differing = a.iter().zip(&b).filter(|(x, y)| x != y).count();
		assert!(differing > 900, "only {differing} of 1024 bytes changed");
	}

	#[test]
	fn sprp_keys_disjoint() {
		let mut a = vec![0x11; 512];
		let mut b = vec![0x11; 512];
		sprp_encrypt(&[1; KEY_SIZE], &mut a);
		sprp_encrypt(&[2; KEY_SIZE], &mut b);
		assert_ne!(a, b);
	}
}
