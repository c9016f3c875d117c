// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Multiplexed-readout grouping engine.

use crate::elements::{Element, ElementKind, StartTime};

/// Partition the readout elements of a sequence into simultaneous-trigger
/// groups, returned as indices into `sequence`.
///
/// A readout joins the current group when its start delay does not exceed
/// the duration of the *previous* readout element (not the group's
/// cumulative span — kept as-is from the original grouping rule); otherwise
/// it opens a new group. Each group becomes a single hardware trigger across
/// all its ADC channels.
pub fn group_mux_ro(sequence: &[Element]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut len_last_readout = 0.0;
    for (index, element) in sequence.iter().enumerate() {
        if element.kind() != ElementKind::Readout {
            continue;
        }
        let joins_current = match element.start_delay() {
            StartTime::Delay(us) => *us <= len_last_readout,
            // a register-valued delay has no static start; never co-trigger
            StartTime::Register(_) => false,
        };
        if joins_current && !groups.is_empty() {
            groups
                .last_mut()
                .expect("groups checked non-empty")
                .push(index);
        } else {
            groups.push(vec![index]);
        }
        len_last_readout = element.duration();
    }
    groups
}
