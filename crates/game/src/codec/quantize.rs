use glam::{Vec2, Vec3};

/// Closed `[lo, hi]` range a quantized value is mapped over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lo: f32,
    pub hi: f32,
}

impl Interval {
    pub const fn new(lo: f32, hi: f32) -> Self {
        Self { lo, hi }
    }

    pub fn width(&self) -> f32 {
        self.hi - self.lo
    }

    /// Largest error `unpack_float(pack_float(v))` can introduce for `v` inside the interval.
    pub fn step(&self, bits: u32) -> f32 {
        self.width() / max_code(bits) as f32
    }

    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.lo, self.hi)
    }
}

#[inline]
pub const fn field_mask(bits: u32) -> u32 {
    if bits >= u32::BITS {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

#[inline]
fn max_code(bits: u32) -> u32 {
    debug_assert!(bits >= 1 && bits <= u32::BITS, "bit width out of range: {bits}");
    field_mask(bits.max(1))
}

pub fn pack_float(v: f32, lo: f32, hi: f32, bits: u32) -> u32 {
    let range = max_code(bits) as f32;
    // NaN saturates to 0 through the float-to-int cast.
    (range * ((v.clamp(lo, hi) - lo) / (hi - lo))) as u32
}

pub fn unpack_float(c: u32, lo: f32, hi: f32, bits: u32) -> f32 {
    let range = max_code(bits);
    let c = c & range;
    (c as f32 / range as f32 * (hi - lo) + lo).clamp(lo, hi)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedFloat<const BITS: u32> {
    pub packed: u32,
}

impl<const BITS: u32> PackedFloat<BITS> {
    const FITS: () = assert!(BITS >= 1 && BITS <= u32::BITS, "field width exceeds container");

    pub fn pack(v: f32, range: Interval) -> Self {
        let () = Self::FITS;
        Self {
            packed: pack_float(v, range.lo, range.hi, BITS),
        }
    }

    pub fn from_packed(packed: u32) -> Self {
        let () = Self::FITS;
        Self {
            packed: packed & field_mask(BITS),
        }
    }

    pub fn unpack(&self, range: Interval) -> f32 {
        unpack_float(self.packed, range.lo, range.hi, BITS)
    }
}

/// Two quantized fields in one `u32`, x in the high bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedFloat2<const BX: u32, const BY: u32> {
    pub packed: u32,
}

impl<const BX: u32, const BY: u32> PackedFloat2<BX, BY> {
    const FITS: () = assert!(
        BX >= 1 && BY >= 1 && BX + BY <= u32::BITS,
        "packed fields exceed container width"
    );

    pub fn pack(v: Vec2, bounds_x: Interval, bounds_y: Interval) -> Self {
        let () = Self::FITS;
        let x = pack_float(v.x, bounds_x.lo, bounds_x.hi, BX);
        let y = pack_float(v.y, bounds_y.lo, bounds_y.hi, BY);
        Self {
            packed: (x << BY) | y,
        }
    }

    pub fn from_packed(packed: u32) -> Self {
        let () = Self::FITS;
        Self { packed }
    }

    pub fn unpack(&self, bounds_x: Interval, bounds_y: Interval) -> Vec2 {
        let x = (self.packed >> BY) & field_mask(BX);
        let y = self.packed & field_mask(BY);
        Vec2::new(
            unpack_float(x, bounds_x.lo, bounds_x.hi, BX),
            unpack_float(y, bounds_y.lo, bounds_y.hi, BY),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedFloat3<const BX: u32, const BY: u32, const BZ: u32> {
    pub packed: u32,
}

impl<const BX: u32, const BY: u32, const BZ: u32> PackedFloat3<BX, BY, BZ> {
    const FITS: () = assert!(
        BX >= 1 && BY >= 1 && BZ >= 1 && BX + BY + BZ <= u32::BITS,
        "packed fields exceed container width"
    );

    pub fn pack(v: Vec3, bounds_x: Interval, bounds_y: Interval, bounds_z: Interval) -> Self {
        let () = Self::FITS;
        let x = pack_float(v.x, bounds_x.lo, bounds_x.hi, BX);
        let y = pack_float(v.y, bounds_y.lo, bounds_y.hi, BY);
        let z = pack_float(v.z, bounds_z.lo, bounds_z.hi, BZ);
        Self {
            packed: (x << (BY + BZ)) | (y << BZ) | z,
        }
    }

    pub fn from_packed(packed: u32) -> Self {
        let () = Self::FITS;
        Self { packed }
    }

    pub fn unpack(&self, bounds_x: Interval, bounds_y: Interval, bounds_z: Interval) -> Vec3 {
        let x = (self.packed >> (BY + BZ)) & field_mask(BX);
        let y = (self.packed >> BZ) & field_mask(BY);
        let z = self.packed & field_mask(BZ);
        Vec3::new(
            unpack_float(x, bounds_x.lo, bounds_x.hi, BX),
            unpack_float(y, bounds_y.lo, bounds_y.hi, BY),
            unpack_float(z, bounds_z.lo, bounds_z.hi, BZ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quantized_equal(a: f32, b: f32, range: Interval, bits: u32) -> bool {
        // f32 rounding in the affine maps scales with the magnitude of the bounds.
        let slack = (range.lo.abs() + range.hi.abs()) * f32::EPSILON * 8.0;
        (a - b).abs() <= range.step(bits) * 1.0001 + slack
    }

    #[test]
    fn single_field_four_bits() {
        let range = Interval::new(-1.0, 1.0);
        let packed = PackedFloat::<4>::pack(0.123, range);
        assert!(packed.packed <= 15);
        assert!(quantized_equal(packed.unpack(range), 0.123, range, 4));
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(pack_float(5.0, -1.0, 1.0, 4), 15);
        assert_eq!(pack_float(-5.0, -1.0, 1.0, 4), 0);
        assert_eq!(unpack_float(15, -1.0, 1.0, 4), 1.0);
        assert_eq!(unpack_float(0, -1.0, 1.0, 4), -1.0);
    }

    #[test]
    fn nan_packs_to_zero() {
        assert_eq!(pack_float(f32::NAN, -1.0, 1.0, 8), 0);
    }

    #[test]
    fn pair_keeps_x_in_high_bits() {
        let bx = Interval::new(-16.0, 16.0);
        let by = Interval::new(-8.0, 8.0);
        let packed = PackedFloat2::<11, 10>::pack(Vec2::new(16.0, -8.0), bx, by);
        assert_eq!(packed.packed, 0x7FF << 10);

        let back = packed.unpack(bx, by);
        assert_eq!(back, Vec2::new(16.0, -8.0));
    }

    #[test]
    fn pair_and_triple_round_trip() {
        let interval = Interval::new(-10.0, 10.0);
        let v = Vec2::new(4.0, -5.0);
        let back = PackedFloat2::<8, 8>::pack(v, interval, interval).unpack(interval, interval);
        assert!(quantized_equal(back.x, v.x, interval, 8));
        assert!(quantized_equal(back.y, v.y, interval, 8));

        let unit = Interval::new(-1.0, 1.0);
        let v = Vec3::new(0.1, -0.2, 0.3);
        let back = PackedFloat3::<11, 10, 11>::pack(v, unit, unit, unit).unpack(unit, unit, unit);
        assert!(quantized_equal(back.x, v.x, unit, 11));
        assert!(quantized_equal(back.y, v.y, unit, 10));
        assert!(quantized_equal(back.z, v.z, unit, 11));
    }

    #[test]
    fn full_width_field() {
        let range = Interval::new(0.0, 1.0);
        assert_eq!(pack_float(1.0, 0.0, 1.0, 32), u32::MAX);
        assert_eq!(PackedFloat::<32>::from_packed(u32::MAX).unpack(range), 1.0);
    }

    proptest! {
        #[test]
        fn round_trip_within_one_step(
            t in 0.0f32..=1.0,
            lo in -100.0f32..100.0,
            width in 1.0f32..200.0,
            bits in 1u32..=16,
        ) {
            let range = Interval::new(lo, lo + width);
            let v = range.lo + t * range.width();
            let back = unpack_float(pack_float(v, range.lo, range.hi, bits), range.lo, range.hi, bits);
            prop_assert!(back >= range.lo && back <= range.hi);
            prop_assert!(quantized_equal(back, v, range, bits), "v={} back={} step={}", v, back, range.step(bits));
        }
    }
}
