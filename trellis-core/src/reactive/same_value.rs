//! Identity comparison used to decide whether a write is a change.
//!
//! Writes are applied only when the new value is not the "same value" as the
//! old one. Sameness follows strict identity semantics: NaN is the same as
//! NaN, `+0.0` and `-0.0` differ, shared references compare by address, and
//! plain data compares by value.

use std::rc::Rc;
use std::sync::Arc;

/// Identity comparison for reactive values.
pub trait SameValue {
    /// Return `true` if writing `other` over `self` would not be a change.
    fn same_value(&self, other: &Self) -> bool;
}

macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str,
);

impl SameValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        if self.is_nan() && other.is_nan() {
            return true;
        }
        self.to_bits() == other.to_bits()
    }
}

impl SameValue for f32 {
    fn same_value(&self, other: &Self) -> bool {
        if self.is_nan() && other.is_nan() {
            return true;
        }
        self.to_bits() == other.to_bits()
    }
}

impl<T: ?Sized> SameValue for Rc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> SameValue for Arc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: SameValue> SameValue for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

impl<A: SameValue, B: SameValue> SameValue for (A, B) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1)
    }
}

impl<A: SameValue, B: SameValue, C: SameValue> SameValue for (A, B, C) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1) && self.2.same_value(&other.2)
    }
}
