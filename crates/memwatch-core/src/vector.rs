use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Three packed `f32`s, laid out exactly as a `float[3]` in the target.
///
/// Instances are filled by a raw byte copy, so there are no derived numeric
/// comparisons; use [`bit_equals`](Self::bit_equals) to detect whether a
/// polled value changed.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Vector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3f {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// X truncated toward zero.
    pub fn ix(&self) -> i32 {
        self.x as i32
    }

    pub fn iy(&self) -> i32 {
        self.y as i32
    }

    pub fn iz(&self) -> i32 {
        self.z as i32
    }

    /// Euclidean distance in single precision.
    pub fn distance(&self, other: &Vector3f) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance in the XY plane; Z is ignored entirely.
    pub fn distance_xy(&self, other: &Vector3f) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Component-wise comparison of raw bit patterns.
    pub fn bit_equals(&self, other: &Vector3f) -> bool {
        self.bit_equals_xy(other) && self.z.to_bits() == other.z.to_bits()
    }

    pub fn bit_equals_xy(&self, other: &Vector3f) -> bool {
        self.x.to_bits() == other.x.to_bits() && self.y.to_bits() == other.y.to_bits()
    }
}

impl From<[f32; 3]> for Vector3f {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vector3f {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_bits(value: f32) -> f32 {
        f32::from_bits(value.to_bits() ^ 1)
    }

    #[test]
    fn test_layout_matches_float_array() {
        assert_eq!(std::mem::size_of::<Vector3f>(), 12);
        assert_eq!(std::mem::align_of::<Vector3f>(), 4);

        let v = Vector3f::new(1.0, -2.5, 3.25);
        let bytes = bytemuck::bytes_of(&v);
        assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &(-2.5f32).to_ne_bytes());
        assert_eq!(&bytes[8..12], &3.25f32.to_ne_bytes());
    }

    #[test]
    fn test_distance() {
        let a = Vector3f::new(0.0, 0.0, 0.0);
        let b = Vector3f::new(3.0, 4.0, 12.0);
        assert_eq!(a.distance(&b), 13.0);
        assert_eq!(b.distance(&a), 13.0);
        assert_eq!(b.distance(&b), 0.0);
    }

    #[test]
    fn test_distance_xy_ignores_z() {
        let a = Vector3f::new(1.0, 2.0, -500.0);
        let b = Vector3f::new(1.0, 2.0, 900.0);
        assert_eq!(a.distance_xy(&b), 0.0);

        let c = Vector3f::new(4.0, 6.0, 0.0);
        assert_eq!(a.distance_xy(&c), 5.0);
    }

    #[test]
    fn test_integer_accessors_truncate() {
        let v = Vector3f::new(1.9, -1.9, 0.5);
        assert_eq!(v.ix(), 1);
        assert_eq!(v.iy(), -1);
        assert_eq!(v.iz(), 0);
    }

    #[test]
    fn test_bit_equals_reflexive_symmetric() {
        let a = Vector3f::new(1.5, f32::NAN, -0.0);
        let b = a;
        assert!(a.bit_equals(&a));
        assert!(a.bit_equals(&b));
        assert!(b.bit_equals(&a));
    }

    #[test]
    fn test_bit_equals_lsb_sensitive() {
        let a = Vector3f::new(100.0, 200.0, 300.0);

        let changed_x = Vector3f::new(next_bits(100.0), 200.0, 300.0);
        let changed_y = Vector3f::new(100.0, next_bits(200.0), 300.0);
        let changed_z = Vector3f::new(100.0, 200.0, next_bits(300.0));

        assert!(!a.bit_equals(&changed_x));
        assert!(!a.bit_equals(&changed_y));
        assert!(!a.bit_equals(&changed_z));
        assert!((a.x - changed_x.x).abs() < 1e-4);
    }

    #[test]
    fn test_bit_equals_distinguishes_signed_zero() {
        let positive = Vector3f::new(0.0, 0.0, 0.0);
        let negative = Vector3f::new(-0.0, 0.0, 0.0);
        assert!(!positive.bit_equals(&negative));
    }

    #[test]
    fn test_bit_equals_xy() {
        let a = Vector3f::new(1.0, 2.0, 3.0);
        let b = Vector3f::new(1.0, 2.0, 4.0);
        assert!(a.bit_equals_xy(&b));
        assert!(!a.bit_equals(&b));
        assert!(!a.bit_equals_xy(&Vector3f::new(1.0, next_bits(2.0), 3.0)));
    }

    #[test]
    fn test_display() {
        let v = Vector3f::new(1.5, -2.0, 0.0);
        assert_eq!(v.to_string(), "1.5 -2 0");
    }
}
