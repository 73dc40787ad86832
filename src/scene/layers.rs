//! Visibility layers
//!
//! Three-layer contract shared by cameras, geometry, and the composer:
//! layer 0 is the default visible scene, layer 1 the environment capture,
//! layer 2 the backface capture.

/// Bit set of visibility layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Empty mask, visible to nothing
    pub const NONE: Self = Self(0);
    /// Layer 0: default visible geometry
    pub const DEFAULT: Self = Self(1 << 0);
    /// Layer 1: environment capture
    pub const ENVIRONMENT: Self = Self(1 << 1);
    /// Layer 2: backface capture (rendered back-side only)
    pub const BACKFACE: Self = Self(1 << 2);

    /// Mask containing a single layer index
    pub fn single(layer: u32) -> Self {
        Self(1 << layer)
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// True when at least one layer is shared
    pub fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_convention() {
        assert_eq!(LayerMask::DEFAULT, LayerMask::single(0));
        assert_eq!(LayerMask::ENVIRONMENT, LayerMask::single(1));
        assert_eq!(LayerMask::BACKFACE, LayerMask::single(2));
    }

    #[test]
    fn intersection() {
        let both = LayerMask::DEFAULT | LayerMask::ENVIRONMENT;
        assert!(both.intersects(LayerMask::ENVIRONMENT));
        assert!(!both.intersects(LayerMask::BACKFACE));
        assert!(both.contains(LayerMask::DEFAULT));
    }
}
