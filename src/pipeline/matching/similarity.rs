/// Lowercase alphanumeric words, de-duplicated, in first-seen order.
pub fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for word in name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if !tokens.contains(&word) {
            tokens.push(word);
        }
    }
    tokens
}

/// The name's tokens joined by single spaces with a space on each side,
/// so `" token "` occurs in the key exactly when the name has that token.
pub fn name_key(name: &str) -> String {
    let tokens = name_tokens(name);
    if tokens.is_empty() {
        return String::new();
    }
    format!(" {} ", tokens.join(" "))
}

/// Token-overlap similarity in [0, 1]: shared tokens over the larger token
/// set. Word order and case do not matter; extra or missing words lower
/// the score. Either side empty scores 0.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let left = name_tokens(a);
    let right = name_tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.iter().filter(|t| right.contains(t)).count();
    shared as f64 / left.len().max(right.len()) as f64
}

/// Case-insensitive equality after collapsing internal whitespace.
/// A missing side never matches.
pub fn field_equality(ocr: Option<&str>, record: &str) -> f64 {
    match ocr {
        Some(value) if !collapse(value).is_empty() && collapse(value) == collapse(record) => 1.0,
        _ => 0.0,
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
