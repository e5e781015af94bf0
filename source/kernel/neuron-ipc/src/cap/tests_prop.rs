// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the capability table
//! OWNERS: @kernel-ipc-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - Names map to exactly one right; allocation never hands out a bound name
//!   - Serials are never reused across rebinding
//!
//! TEST_SCENARIOS:
//!   - allocate_extract_sequences_stay_consistent(): random op sequences match a model
//!   - serials_are_unique(): every binding gets a fresh serial

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use super::CapTable;
use crate::error::IpcError;
use crate::rights::{DeadName, Right};
use crate::types::{Name, PortId};

#[derive(Clone, Debug)]
enum Op {
    Allocate(u64),
    Extract(u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u64>().prop_map(Op::Allocate),
        (0u32..24).prop_map(Op::Extract),
    ]
}

fn dead(raw: u64) -> Right {
    Right::DeadName(DeadName::new(PortId::from_raw(raw)))
}

proptest! {
    #[test]
    fn allocate_extract_sequences_stay_consistent(ops in proptest::collection::vec(arb_op(), 0..64)) {
        let mut table = CapTable::with_capacity(20);
        let mut model: BTreeMap<Name, u64> = BTreeMap::new();
        for op in ops {
            match op {
                Op::Allocate(tag) => match table.allocate(dead(tag)) {
                    Ok(name) => {
                        prop_assert!(!name.is_reserved());
                        prop_assert!(model.insert(name, tag).is_none());
                    }
                    Err(refused) => {
                        prop_assert_eq!(refused.error, IpcError::NoSpace);
                        prop_assert_eq!(model.len(), 20 - Name::FIRST_DYNAMIC as usize);
                    }
                },
                Op::Extract(raw) => {
                    let name = Name::from_raw(raw);
                    match model.remove(&name) {
                        Some(tag) => prop_assert_eq!(table.extract(name).unwrap().port(), Some(PortId::from_raw(tag))),
                        None => prop_assert_eq!(table.extract(name).unwrap_err(), IpcError::InvalidName),
                    }
                }
            }
        }
        let names: Vec<Name> = table.names().collect();
        let expected: Vec<Name> = model.keys().copied().collect();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn serials_are_unique(rounds in 1usize..32) {
        let mut table = CapTable::with_capacity(16);
        let mut seen = BTreeSet::new();
        for round in 0..rounds {
            let name = table.allocate(dead(round as u64)).unwrap();
            prop_assert!(seen.insert(table.serial(name).unwrap()));
            table.extract(name).unwrap();
        }
    }
}
