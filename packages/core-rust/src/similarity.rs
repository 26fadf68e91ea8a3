//! Token-set title similarity for the fuzzy match tiers.
//!
//! Titles are tokenized on whitespace and compared as sets, so word
//! reordering and repeated words do not lower the score, and extra words on
//! either side are tolerated. The character-level kernel is the normalized
//! Indel similarity from `rapidfuzz`, which the two cluster engines consume
//! as a score in `[0, 1]`.
//!
//! Guarantees relied on by callers: the score is symmetric, insensitive to
//! token order, and exactly `1.0` when both titles carry the same token set.

use std::collections::BTreeSet;

use rapidfuzz::fuzz;

/// Indel similarity of two strings in `[0, 1]`.
fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    fuzz::ratio(a.chars(), b.chars()) / 100.0
}

/// Token-set similarity of two titles in `[0, 1]`.
///
/// Builds the sorted token intersection and the two one-sided remainders,
/// then scores the three pairings (intersection vs either side, side vs
/// side) and returns the best. Empty-vs-empty scores `1.0`; empty vs
/// non-empty scores `0.0`.
#[must_use]
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sect_str = sect.join(" ");
    let combined_a = join_tokens(&sect_str, &only_a);
    let combined_b = join_tokens(&sect_str, &only_b);

    // Identical token sets: both remainders are empty, short-circuit to 1.0
    // rather than trusting float behavior of the kernel.
    if only_a.is_empty() && only_b.is_empty() {
        return 1.0;
    }

    let r1 = ratio(&sect_str, &combined_a);
    let r2 = ratio(&sect_str, &combined_b);
    let r3 = ratio(&combined_a, &combined_b);
    r1.max(r2).max(r3)
}

fn join_tokens(sect: &str, rest: &[&str]) -> String {
    if rest.is_empty() {
        sect.to_string()
    } else if sect.is_empty() {
        rest.join(" ")
    } else {
        format!("{sect} {}", rest.join(" "))
    }
}
