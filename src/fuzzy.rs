//! Fuzzy string matching utilities using Levenshtein distance
//!
//! Used by wake phrase matching to tolerate small misrecognitions in
//! speech transcripts.

/// Normalize transcript or phrase text for matching: lowercase and trim
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Calculate Levenshtein distance between two strings (counted in chars)
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0; b.len() + 1]; a.len() + 1];

    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        dp[0][j] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[a.len()][b.len()]
}

/// Normalized similarity in [0, 1]: `(longest - distance) / longest`.
///
/// Two empty strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    (longest - distance) as f64 / longest as f64
}
