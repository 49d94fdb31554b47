//! Cheap token-count heuristic.
//!
//! CJK ideographs weigh half a token, everything else a quarter. This is an
//! approximation of the upstream tokenizer, good enough for thresholds and
//! budget warnings but never for exact limits.

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Estimated tokens in `text`, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    (cjk * 2 + other).div_ceil(4)
}
