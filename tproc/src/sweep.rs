// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Merged nested-sweep descriptor.

use crate::registers::{RegisterField, RegisterHandle};
use crate::{Error, Result};

/// Linear range swept over one register.
///
/// `start`/`stop` are in the units of the register's field: integer gain
/// values for [`RegisterField::Gain`], MHz for frequency, degrees for phase
/// and microseconds for time registers. The runtime derives the signed
/// per-iteration register step from the range and point count.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRange {
    pub register: RegisterHandle,
    pub start: f64,
    pub stop: f64,
    pub expts: u32,
}

/// One loop level of a hardware sweep: several registers stepped together.
///
/// Mirrors the runtime's merge of simultaneous sweeps; every range advances
/// once per iteration of this dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepDimension {
    ranges: Vec<SweepRange>,
    expts: u32,
}

impl SweepDimension {
    /// Merge simultaneously swept ranges into one dimension. All ranges must
    /// agree on the point count.
    pub fn merge(ranges: Vec<SweepRange>) -> Result<Self> {
        let expts = match ranges.first() {
            Some(range) => range.expts,
            None => return Err(Error::MismatchedSweepRanges),
        };
        if ranges.iter().any(|range| range.expts != expts) {
            return Err(Error::MismatchedSweepRanges);
        }
        Ok(SweepDimension { ranges, expts })
    }

    pub fn ranges(&self) -> &[SweepRange] {
        &self.ranges
    }

    pub fn expts(&self) -> u32 {
        self.expts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(addr: u8, expts: u32) -> SweepRange {
        SweepRange {
            register: RegisterHandle {
                channel: 0,
                page: 0,
                addr,
                field: RegisterField::Gain,
            },
            start: 0.0,
            stop: 100.0,
            expts,
        }
    }

    #[test]
    fn merge_requires_matching_point_counts() {
        assert!(SweepDimension::merge(vec![range(1, 10), range(2, 10)]).is_ok());
        assert!(SweepDimension::merge(vec![range(1, 10), range(2, 11)]).is_err());
        assert!(SweepDimension::merge(vec![]).is_err());
    }
}
