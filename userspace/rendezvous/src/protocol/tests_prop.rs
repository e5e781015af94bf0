// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the rendezvous frame codec
//! OWNERS: @runtime
//! NOTE: Tests only; no registry logic.
//!
//! TEST_SCENARIOS:
//!   - decode_never_panics(): arbitrary bytes decode to a value or an error
//!   - trailing_bytes_are_rejected(): a valid frame with extra bytes never decodes

use proptest::prelude::*;

use super::{decode_request, decode_response, encode_request, Op, MAX_NAME_LEN};

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Register), Just(Op::Lookup), Just(Op::Unregister)]
}

proptest! {
    #[test]
    fn decode_never_panics(frame in proptest::collection::vec(any::<u8>(), 0..300)) {
        let _ = decode_request(&frame);
        let _ = decode_response(&frame, Op::Lookup);
    }

    #[test]
    fn trailing_bytes_are_rejected(
        op in arb_op(),
        name in "[a-z][a-z0-9.]{0,63}",
        extra in proptest::collection::vec(any::<u8>(), 1..8),
    ) {
        prop_assume!(name.len() <= MAX_NAME_LEN);
        let mut frame = encode_request(op, &name).unwrap();
        frame.extend_from_slice(&extra);
        prop_assert!(decode_request(&frame).is_err());
    }
}
