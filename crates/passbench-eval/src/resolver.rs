//! Function-name resolution between assertions and generated code.
//!
//! Generated solutions frequently define the right function under a
//! slightly wrong name (`Add` for `add`, `remove_occurrence` for
//! `remove_Occ`). The resolver extracts the name the assertions expect
//! and picks the defined function to alias it to, so a correct solution
//! is not failed over its spelling.

use std::cmp::Reverse;
use std::collections::HashMap;

use regex::Regex;

/// Minimum similarity ratio for a fuzzy alias.
pub const SIMILARITY_CUTOFF: f64 = 0.82;

/// Extract candidate function names from assertion statements, ranked
/// by call frequency. Ties keep first-occurrence order. The head of the
/// returned list is the name the assertions most likely target.
pub fn expected_names(tests: &[String]) -> Vec<String> {
    let Ok(re) = Regex::new(r"\b([A-Za-z_]\w*)\s*\(") else {
        return Vec::new();
    };
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for test in tests {
        for caps in re.captures_iter(test) {
            if let Some(m) = caps.get(1) {
                match counts.get_mut(m.as_str()) {
                    Some(n) => *n += 1,
                    None => {
                        counts.insert(m.as_str().to_string(), 1);
                        order.push(m.as_str().to_string());
                    }
                }
            }
        }
    }
    let mut ranked = order;
    ranked.sort_by_key(|name| Reverse(counts.get(name).copied().unwrap_or(0)));
    ranked
}

/// Pick the defined function to alias `expected` to, if any.
///
/// Resolution chain, first hit wins:
/// 1. `expected` is already defined: no alias needed.
/// 2. Exact match after normalization (underscores stripped, lowercased),
///    lexicographically smallest on ties.
/// 3. Fuzzy match with ratio >= [`SIMILARITY_CUTOFF`].
/// 4. Exactly one function defined: use it regardless of name.
pub fn choose_alias(expected: &str, defined: &[String]) -> Option<String> {
    if defined.iter().any(|d| d == expected) {
        return None;
    }
    if defined.is_empty() {
        return None;
    }

    let target = normalize_name(expected);
    let mut exact: Vec<&String> = defined
        .iter()
        .filter(|d| normalize_name(d) == target)
        .collect();
    if !exact.is_empty() {
        exact.sort();
        return Some(exact[0].clone());
    }

    let best = defined
        .iter()
        .map(|cand| (similarity(cand, expected), cand))
        .max_by(|x, y| x.0.total_cmp(&y.0).then_with(|| x.1.cmp(y.1)));
    if let Some((score, name)) = best {
        if score >= SIMILARITY_CUTOFF {
            return Some(name.clone());
        }
    }

    if defined.len() == 1 {
        return Some(defined[0].clone());
    }
    None
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_lowercase()
}

/// Similarity ratio `2 * M / T` where `M` is the total length of the
/// longest matching blocks between the two strings and `T` the sum of
/// their lengths. Two empty strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let total = a_chars.len() + b_chars.len();
    if total == 0 {
        return 1.0;
    }
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b_chars.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }
    let matches = match_total(&a_chars, &b2j, 0, a_chars.len(), 0, b_chars.len());
    2.0 * matches as f64 / total as f64
}

/// Total matched length over `a[alo..ahi]` x `b[blo..bhi]`: take the
/// leftmost longest common block, then recurse on the ranges before and
/// after it.
fn match_total(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> usize {
    let (i, j, k) = longest_match(a, b2j, alo, ahi, blo, bhi);
    if k == 0 {
        return 0;
    }
    let mut total = k;
    if alo < i && blo < j {
        total += match_total(a, b2j, alo, i, blo, j);
    }
    if i + k < ahi && j + k < bhi {
        total += match_total(a, b2j, i + k, ahi, j + k, bhi);
    }
    total
}

fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best_i = alo;
    let mut best_j = blo;
    let mut best_size = 0;
    // j2len[j] is the length of the match ending at (i - 1, j).
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for i in alo..ahi {
        let mut next_j2len: HashMap<usize, usize> = HashMap::new();
        if let Some(indices) = b2j.get(&a[i]) {
            for &j in indices {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let prev = if j == 0 {
                    0
                } else {
                    j2len.get(&(j - 1)).copied().unwrap_or(0)
                };
                let k = prev + 1;
                next_j2len.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        j2len = next_j2len;
    }
    (best_i, best_j, best_size)
}
