//! Silence classification and trimming over signed 16-bit PCM
//!
//! Pure functions; the capture state machine and the finalization step both
//! build on these.

/// Returns true iff every sample's absolute value is strictly below `threshold`.
///
/// An empty block is silent. A threshold of 0 means any non-zero sample is
/// voice.
#[must_use]
pub fn is_silent(block: &[i16], threshold: i16) -> bool {
    block
        .iter()
        .all(|&s| (s.unsigned_abs()) < threshold.unsigned_abs())
}

/// Trim quiet samples from both ends of a captured buffer.
///
/// Leading and trailing samples with absolute value `<= threshold` are
/// dropped; the interior is preserved verbatim, including quiet stretches.
/// Empty input yields empty output, and the operation is idempotent.
#[must_use]
pub fn trim(buffer: &[i16], threshold: i16) -> Vec<i16> {
    let limit = threshold.unsigned_abs();
    let loud = |s: &i16| s.unsigned_abs() > limit;

    let Some(start) = buffer.iter().position(loud) else {
        return Vec::new();
    };
    // A loud sample exists, so rposition cannot fail here.
    let end = buffer.iter().rposition(loud).unwrap_or(start);
    buffer[start..=end].to_vec()
}
