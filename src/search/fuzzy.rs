//! Edit distance and word tokenization for fuzzy matching.

/// Levenshtein distance between `a` and `b`, or `None` once it is known to
/// exceed `max`.
///
/// Works on chars, keeps a single row, and stops early when every cell of a
/// row is already over the bound.
pub fn bounded_levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.len().abs_diff(b_chars.len()) > max {
        return None;
    }
    if a_chars.is_empty() {
        return Some(b_chars.len());
    }
    if b_chars.is_empty() {
        return Some(a_chars.len());
    }

    let mut row: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a_chars.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        let mut row_min = row[0];

        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let value = (row[j + 1] + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = row[j + 1];
            row[j + 1] = value;
            row_min = row_min.min(value);
        }

        if row_min > max {
            return None;
        }
    }

    let distance = row[b_chars.len()];
    (distance <= max).then_some(distance)
}

/// Split `text` into words of alphanumeric characters (plus `_`), yielding
/// each word with its byte offset.
pub fn words(text: &str) -> impl Iterator<Item = (usize, &str)> + '_ {
    let mut chars = text.char_indices().peekable();
    std::iter::from_fn(move || {
        while let Some(&(_, c)) = chars.peek() {
            if is_word_char(c) {
                break;
            }
            chars.next();
        }
        let (start, _) = *chars.peek()?;
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if !is_word_char(c) {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }
        Some((start, &text[start..end]))
    })
}

pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
