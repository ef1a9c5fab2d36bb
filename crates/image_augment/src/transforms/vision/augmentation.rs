use ndarray::{Array3, Axis};
use rand::Rng;

// ============================================================================
// MirrorPolicy
// ============================================================================

/// Decides per call whether the output tensor is flipped horizontally.
///
/// # Example
/// ```ignore
/// if MirrorPolicy::Random.should_flip(&mut rng) {
///     flip_horizontal(&mut tensor);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPolicy {
    Never,
    Always,
    /// Fresh fair coin flip on every call.
    Random,
}

impl MirrorPolicy {
    pub fn should_flip<R: Rng>(self, rng: &mut R) -> bool {
        match self {
            MirrorPolicy::Never => false,
            MirrorPolicy::Always => true,
            MirrorPolicy::Random => rng.random_bool(0.5),
        }
    }
}

// ============================================================================
// flip_horizontal
// ============================================================================

/// Reverses the column order of every row of a `[C, H, W]` tensor, in place.
///
/// Flipping twice restores the original tensor.
pub fn flip_horizontal(tensor: &mut Array3<f32>) {
    for mut row in tensor.lanes_mut(Axis(2)) {
        let width = row.len();
        for x in 0..width / 2 {
            row.swap(x, width - 1 - x);
        }
    }
}
