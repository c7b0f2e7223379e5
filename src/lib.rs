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

//! Sphinx packet format for anonymous communication over a mix network.
//!
//! A packet consists of a fixed-size header and a fixed-size payload. The header carries a
//! blinded key-exchange element (alpha), onion-encrypted routing information (beta), and a MAC
//! over the routing information (gamma). The payload (delta) is permuted at every hop with a
//! wide-block cipher. Packets are bitwise unlinkable across hops: every byte of the packet
//! changes at every hop, and the sizes never do.
//!
//! The main operations:
//!
//! - [`create_forward_message`](client::create_forward_message) builds a packet routing a
//!   message through a chosen path to a destination.
//! - [`process_packet`](node::process_packet) peels one layer at a mixnode and yields the
//!   packet for the next hop together with this hop's routing instruction.
//! - [`create_surb`](surb::create_surb) / [`package_surb`](surb::package_surb) /
//!   [`receive_surb`](surb::receive_surb) implement single-use reply blocks, which let a party
//!   reply to a sender it cannot identify.
//!
//! Route selection over a [`MixnodeDirectory`](directory::MixnodeDirectory), replay defense
//! ([`replay::ReplayFilter`]) and a binary wire encoding ([`wire`]) round out what a deployment
//! needs around the packet format itself.

pub mod client;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod header;
pub mod node;
pub mod padding;
pub mod params;
pub mod replay;
pub mod surb;
pub mod wire;

pub use client::{
	create_forward_message, max_payload_size, receive_forward, DestinationAndMessage, PathHop,
	MAX_DEST_SIZE,
};
pub use crypto::KeyPair;
pub use directory::{sample_delay, Mixnode, MixnodeDirectory, RouteProvider};
pub use error::SphinxError;
pub use header::{Header, PacketContent};
pub use node::{process_packet, ProcessedPacket};
pub use params::{SphinxParams, DEFAULT_BODY_LEN, DEFAULT_HEADER_LEN};
pub use replay::{ReplayFilter, SharedReplayFilter};
pub use surb::{
	create_surb, package_surb, receive_surb, NymTuple, SingleUseReplyBlock, SurbKeystore,
};
pub use wire::{
	pack_message, unpack_message, MixnodeIndex, RoutingInstruction, SphinxPacket, SurbId,
};
