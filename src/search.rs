use num_traits::Float;

/// Find the insertion point for `q` in the ascending `array`
pub fn binsearch<T: Float>(array: &[T], q: T) -> usize {
    match array.binary_search_by(|x| x.partial_cmp(&q).unwrap_or(std::cmp::Ordering::Less)) {
        Ok(i) => i,
        Err(i) => i,
    }
}

/// Find the index of the value in the ascending `array` closest to `target_val`
pub fn nearest<T: Float>(array: &[T], target_val: T) -> usize {
    let n = array.len();
    if n == 0 {
        return 0;
    }
    let i = binsearch(array, target_val);
    if i == 0 {
        0
    } else if i >= n {
        n - 1
    } else if (array[i] - target_val).abs() < (target_val - array[i - 1]).abs() {
        i
    } else {
        i - 1
    }
}

/// Find the inclusive index range of `array` whose values lie in `[lo, hi]`.
///
/// Returns `None` if no point of `array` falls in the interval.
pub fn find_between<T: Float>(array: &[T], lo: T, hi: T) -> Option<(usize, usize)> {
    if array.is_empty() || hi < lo {
        return None;
    }
    let lo_i = binsearch(array, lo);
    let mut hi_i = binsearch(array, hi);
    if hi_i == array.len() || array[hi_i] > hi {
        if hi_i == 0 {
            return None;
        }
        hi_i -= 1;
    }
    if lo_i > hi_i {
        None
    } else {
        Some((lo_i, hi_i))
    }
}
