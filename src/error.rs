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

//! Error handling.

/// Errors raised while building, peeling, or decoding Sphinx packets. All of these are terminal
/// for the packet in question: there are no retries and no partial recovery at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SphinxError {
	/// A MAC check failed; either the header MAC at a relay or the payload MAC at the final
	/// recipient.
	#[error("MAC mismatch")]
	MacMismatch,
	/// A field did not have the size required by the system parameters.
	#[error("bad length: expected {expected} bytes, got {got}")]
	BadLength { expected: usize, got: usize },
	/// Bytes that should encode a group element did not decode to a valid point.
	#[error("invalid group element encoding")]
	InvalidGroupElement,
	/// The route, destination, or message does not fit in the fixed header or body budget.
	#[error("insufficient capacity: {needed} bytes needed, {available} available")]
	InsufficientCapacity { needed: usize, available: usize },
	/// No padding marker was found while unpadding a body.
	#[error("invalid padding")]
	InvalidPadding,
	/// More hops were requested than the mixnode pool can provide.
	#[error("route of {requested} hops requested from a pool of {available}")]
	RouteCountExceedsPool { requested: usize, available: usize },
	/// A routing instruction carried a flag byte this implementation does not know.
	#[error("unknown routing flag {0:#04x}")]
	UnknownRoutingFlag(u8),
}
