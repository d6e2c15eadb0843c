//! Touch latch edge detection.

/// The outcome of a focus change on a touch latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchTransition {
    /// The latch value after the focus change.
    pub is_touched: bool,
    /// `true` only when the latch flipped from untouched to touched.
    pub rising_edge: bool,
}

/// Computes the touch latch after focus moves from `was_focused` to `now_focused`.
///
/// The latch sets when focus is lost after having been gained and never
/// clears (only a reset does that).
///
/// ```
/// use formunit_forms::touch::touch_transition;
///
/// let blurred = touch_transition(false, true, false);
/// assert!(blurred.is_touched && blurred.rising_edge);
///
/// let again = touch_transition(true, true, false);
/// assert!(again.is_touched && !again.rising_edge);
/// ```
pub const fn touch_transition(
    prev_touched: bool,
    was_focused: bool,
    now_focused: bool,
) -> TouchTransition {
    let is_touched = prev_touched || (was_focused && !now_focused);
    TouchTransition {
        is_touched,
        rising_edge: is_touched && !prev_touched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_gain_does_not_touch() {
        let t = touch_transition(false, false, true);
        assert!(!t.is_touched);
        assert!(!t.rising_edge);
    }

    #[test]
    fn test_blur_without_focus_does_not_touch() {
        let t = touch_transition(false, false, false);
        assert!(!t.is_touched);
    }

    #[test]
    fn test_latch_never_clears() {
        for was in [false, true] {
            for now in [false, true] {
                let t = touch_transition(true, was, now);
                assert!(t.is_touched);
                assert!(!t.rising_edge);
            }
        }
    }

    #[test]
    fn test_rising_edge_only_on_first_blur() {
        let first = touch_transition(false, true, false);
        assert!(first.rising_edge);
        let second = touch_transition(first.is_touched, true, false);
        assert!(!second.rising_edge);
    }
}
