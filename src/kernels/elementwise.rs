/// `acc[i] = sat16(acc[i] + other[i])`.
#[inline]
pub fn cwise_add_assign(acc: &mut [i16], other: &[i16]) {
    debug_assert_eq!(acc.len(), other.len());
    for (a, &b) in acc.iter_mut().zip(other) { *a = a.saturating_add(b); }
}

/// Symmetric clamp to `[-clip, clip]`.
#[inline]
pub fn cwise_clipping(data: &mut [i16], clip: i16) {
    debug_assert!(clip >= 0);
    for v in data.iter_mut() { *v = (*v).clamp(-clip, clip); }
}
