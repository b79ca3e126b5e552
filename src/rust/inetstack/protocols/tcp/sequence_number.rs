// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// This file defines a type to represent a TCP Sequence Number.
//
// RFC 793, Section 3.3 defines TCP sequence numbers.  The sequence number space ranges from 0 to 2^32 - 1.  This space
// "wraps around", so all arithmetic dealing with sequence numbers must be performed modulo 2^32.  This also means that
// excluding equality, all comparisons between sequence numbers are non-transitive.  That is, for any three distinct
// sequence numbers a, b, & c, having a < b and b < c being true does NOT necessarily imply that a < c.
//
// RFC 1323 timestamps live in the same kind of wrapping 32-bit space and are compared the same way (see the tstmp_*
// functions below), but they are plain u32s since they are never mixed with sequence numbers.

use std::{
    cmp::Ordering,
    convert::From,
    fmt,
};

// Internally, we store sequence numbers as unsigned 32-bit integers.
//
// We allow our sequence numbers to be cloned, copied, created, and checked for equality the same as for u32.  We
// restrict all other behaviors to those we explicitly define below.
//
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SeqNumber {
    value: u32,
}

impl SeqNumber {
    /// Signed distance from `other` to `self`.  Positive when `self` is ahead of `other`.
    #[inline]
    pub fn delta(self, other: SeqNumber) -> i32 {
        self.value.wrapping_sub(other.value) as i32
    }

    /// The later of two sequence numbers.
    #[inline]
    pub fn max(self, other: SeqNumber) -> SeqNumber {
        if self > other {
            self
        } else {
            other
        }
    }

    /// The earlier of two sequence numbers.
    #[inline]
    pub fn min(self, other: SeqNumber) -> SeqNumber {
        if self < other {
            self
        } else {
            other
        }
    }
}

impl From<SeqNumber> for u32 {
    #[inline]
    fn from(item: SeqNumber) -> u32 {
        item.value
    }
}

impl From<u32> for SeqNumber {
    #[inline]
    fn from(item: u32) -> Self {
        SeqNumber { value: item }
    }
}

impl std::fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

// Add two sequence numbers together.
impl std::ops::Add for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn add(self, other: SeqNumber) -> SeqNumber {
        (self.value.wrapping_add(other.value)).into()
    }
}

// Advance a sequence number by a byte count.
impl std::ops::Add<u32> for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn add(self, other: u32) -> SeqNumber {
        (self.value.wrapping_add(other)).into()
    }
}

impl std::ops::AddAssign<u32> for SeqNumber {
    #[inline]
    fn add_assign(&mut self, other: u32) {
        self.value = self.value.wrapping_add(other);
    }
}

// Subtract a sequence number from another one.
impl std::ops::Sub for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn sub(self, other: SeqNumber) -> SeqNumber {
        (self.value.wrapping_sub(other.value)).into()
    }
}

// Move a sequence number back by a byte count.
impl std::ops::Sub<u32> for SeqNumber {
    type Output = SeqNumber;

    #[inline]
    fn sub(self, other: u32) -> SeqNumber {
        (self.value.wrapping_sub(other)).into()
    }
}

// We define the PartialOrd trait in order to support the "<", "<=", ">", and ">=" operators on sequence numbers.
// Strictly speaking, however, sequence numbers are not a partially ordered set (much less a totally ordered set) due to
// the fact that they wrap around.  The ordering reported here is only meaningful between two sequence numbers that are
// less than half the space apart, which is always the case inside a window.
impl std::cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.delta(*other).cmp(&0))
    }

    #[inline]
    fn lt(&self, other: &Self) -> bool {
        self.delta(*other) < 0
    }

    #[inline]
    fn le(&self, other: &Self) -> bool {
        self.delta(*other) <= 0
    }

    #[inline]
    fn gt(&self, other: &Self) -> bool {
        self.delta(*other) > 0
    }

    #[inline]
    fn ge(&self, other: &Self) -> bool {
        self.delta(*other) >= 0
    }
}

// Note that we specifically don't define std::cmp:Ord for sequence numbers, as there is no total order for them.

/// Timestamp `a` is older than `b`.
#[inline]
pub fn tstmp_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Timestamp `a` is not older than `b`.
#[inline]
pub fn tstmp_geq(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) >= 0
}

// Unit tests for SeqNumber type.
#[cfg(test)]
mod tests {
    use super::{
        tstmp_geq,
        tstmp_lt,
        SeqNumber,
    };
    use ::anyhow::Result;
    use ::rand::{
        rngs::SmallRng,
        Rng,
        SeedableRng,
    };

    // Test basic comparisons between sequence numbers of various values.
    #[test]
    fn comparison() -> Result<()> {
        let s0: SeqNumber = SeqNumber::from(0);
        let s1: SeqNumber = SeqNumber::from(1);
        let s2: SeqNumber = SeqNumber::from(0x20000000);
        let s3: SeqNumber = SeqNumber::from(0x3fffffff);
        let s4: SeqNumber = SeqNumber::from(0x7fffffff);
        let s6: SeqNumber = SeqNumber::from(0x80000001);
        let s7: SeqNumber = SeqNumber::from(0xffffffff);

        crate::ensure_eq!(s0, s0);
        crate::ensure_neq!(s0, s1);
        crate::ensure_neq!(s0, s7);

        crate::ensure_eq!(!(s0 < s0), true);
        crate::ensure_eq!(!(s0 > s0), true);

        crate::ensure_eq!(s0 < s1, true);
        crate::ensure_eq!(s0 < s2, true);
        crate::ensure_eq!(s0 < s3, true);
        crate::ensure_eq!(s0 < s4, true);
        crate::ensure_eq!(s0 > s6, true);
        crate::ensure_eq!(s0 > s7, true);

        // Values just below the wrap point precede small values.
        crate::ensure_eq!(SeqNumber::from(0xfffffffe) < SeqNumber::from(2), true);
        crate::ensure_eq!(SeqNumber::from(2).delta(SeqNumber::from(0xfffffffe)), 4);

        Ok(())
    }

    // Test that basic comparisons (and addition) handle wrap around properly.
    #[test]
    fn wrap_around() -> Result<()> {
        let zero: SeqNumber = SeqNumber::from(0);
        let one: SeqNumber = SeqNumber::from(1);
        let big: SeqNumber = SeqNumber::from(0xffffffff);

        crate::ensure_neq!(zero, big);
        crate::ensure_eq!(big + one, zero);
        crate::ensure_eq!(big + 1, zero);
        crate::ensure_eq!(zero - 1, big);
        crate::ensure_eq!(big.max(one), one);
        crate::ensure_eq!(big.min(one), big);

        let half: u32 = 0x7fffffff;
        for number in (0..u32::MAX).step_by(0x10001) {
            let current: SeqNumber = SeqNumber::from(number);
            let next: SeqNumber = current + 1;
            crate::ensure_eq!(current < next, true);
            crate::ensure_eq!(current < current + half, true);
            crate::ensure_eq!(current > next + half + 1, true);
        }

        Ok(())
    }

    // `a < b` is exactly `!(a >= b)` for arbitrary values.
    #[test]
    fn lt_is_not_geq() -> Result<()> {
        let mut rng: SmallRng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..10_000 {
            let a: SeqNumber = SeqNumber::from(rng.gen::<u32>());
            let b: SeqNumber = SeqNumber::from(rng.gen::<u32>());
            crate::ensure_eq!(a < b, !(a >= b));
            crate::ensure_eq!(a > b, !(a <= b));
        }
        Ok(())
    }

    #[test]
    fn timestamps() -> Result<()> {
        crate::ensure_eq!(tstmp_lt(0xfffffff0, 5), true);
        crate::ensure_eq!(tstmp_geq(5, 0xfffffff0), true);
        crate::ensure_eq!(tstmp_geq(7, 7), true);
        crate::ensure_eq!(tstmp_lt(7, 7), false);
        Ok(())
    }
}
