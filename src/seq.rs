use std::fmt::{Display, Formatter};

/// A 16-bit wrapping sequence number.
///
/// The sequence space wraps at 2^16, so there is no total order on sequence
/// numbers - `a` is considered 'before' `b` iff the forward distance from `a`
/// to `b` is less than half the sequence space. All windows in this protocol
/// are far smaller than 2^15, which makes this comparison unambiguous for
/// any two sequence numbers that can be live at the same time.
///
/// NB: Because the modular comparison is not a total order, `Seq`
///      deliberately does not implement `Ord` - buffers are keyed by hash
///      maps and iterated in modular order starting from a known reference
///      point instead.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Seq(u16);

impl Display for Seq {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Seq {
    pub const ZERO: Seq = Seq(0);

    const HALF_RANGE: u16 = 1 << 15;

    pub fn from_raw(value: u16) -> Seq {
        Seq(value)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    pub fn next(&self) -> Seq {
        Seq(self.0.wrapping_add(1))
    }

    pub fn prev(&self) -> Seq {
        Seq(self.0.wrapping_sub(1))
    }

    pub fn plus(&self, n: u16) -> Seq {
        Seq(self.0.wrapping_add(n))
    }

    /// modular 'self < other'
    pub fn is_before(&self, other: Seq) -> bool {
        let forward = other.0.wrapping_sub(self.0);
        forward != 0 && forward < Self::HALF_RANGE
    }

    /// modular 'self <= other'
    pub fn is_at_or_before(&self, other: Seq) -> bool {
        other.0.wrapping_sub(self.0) < Self::HALF_RANGE
    }

    /// number of forward steps from `self` to `other`, wrapping
    pub fn distance_to(&self, other: Seq) -> u16 {
        other.0.wrapping_sub(self.0)
    }
}
