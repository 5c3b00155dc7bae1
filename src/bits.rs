//! Extraction and insertion of register sub-fields described by a mask.
//!
//! Masks are expected to be a single contiguous run of set bits. A zero mask describes an empty
//! field, so both operations yield zero.
use num_traits::{
    PrimInt,
    WrappingAdd,
    WrappingMul,
};

/// The lowest set bit of `mask`, which is the weight of the field's least significant bit
fn field_lsb<T>(mask: T) -> T
where
    T: PrimInt + WrappingAdd,
{
    mask & (!mask).wrapping_add(&T::one())
}

/// Pull the field described by `mask` out of `value`, shifted down to bit zero
#[must_use]
pub fn extract_field<T>(value: T, mask: T) -> T
where
    T: PrimInt + WrappingAdd,
{
    if mask.is_zero() {
        return T::zero();
    }
    (value & mask) / field_lsb(mask)
}

/// Shift `field` up into the position described by `mask`, dropping bits that don't fit
#[must_use]
pub fn insert_field<T>(field: T, mask: T) -> T
where
    T: PrimInt + WrappingAdd + WrappingMul,
{
    if mask.is_zero() {
        return T::zero();
    }
    field.wrapping_mul(&field_lsb(mask)) & mask
}

/// Replace the bits of `value` under `mask` with `field`
#[must_use]
pub fn replace_field<T>(value: T, field: T, mask: T) -> T
where
    T: PrimInt + WrappingAdd + WrappingMul,
{
    (value & !mask) | insert_field(field, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mask() {
        assert_eq!(extract_field(0xFFFFu16, 0), 0);
        assert_eq!(insert_field(0xFFFFu16, 0), 0);
    }

    #[test]
    fn test_extract() {
        assert_eq!(extract_field(0xABCDu16, 0x00F0), 0xC);
        assert_eq!(extract_field(0xABCDu16, 0xFF00), 0xAB);
        assert_eq!(extract_field(0x8000_0000u32, 0x8000_0000), 1);
    }

    #[test]
    fn test_insert_truncates() {
        assert_eq!(insert_field(0x1Fu16, 0x00F0), 0x00F0);
        assert_eq!(insert_field(3u16, 0x0300), 0x0300);
    }

    #[test]
    fn test_replace() {
        assert_eq!(replace_field(0xFFFFu16, 0x0, 0x0F00), 0xF0FF);
        assert_eq!(replace_field(0x0000_0000u32, 0x5, 0x0000_0F00), 0x0000_0500);
    }

    #[test]
    fn test_round_trip_every_contiguous_mask() {
        // Every contiguous run in a 16 bit register, every value that fits
        for lsb in 0..16u32 {
            for width in 1..=(16 - lsb) {
                let mask = (((1u32 << width) - 1) << lsb) as u16;
                let max = ((1u32 << width) - 1) as u16;
                for x in (0..=max).step_by(usize::from(max / 64).max(1)) {
                    assert_eq!(extract_field(insert_field(x, mask), mask), x);
                }
                assert_eq!(extract_field(insert_field(max, mask), mask), max);
            }
        }
    }

    #[test]
    fn test_round_trip_wide() {
        let mask = 0xFFFF_F000u32;
        for x in [0u32, 1, 0x7FFFF, 0xFFFFF, 0x12345] {
            assert_eq!(extract_field(insert_field(x, mask), mask), x);
        }
        assert_eq!(extract_field(u32::MAX, u32::MAX), u32::MAX);
    }
}
