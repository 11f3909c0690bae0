// src/notify/chunk.rs

//! Splitting long chat messages under a character cap.

/// How far back from the cap a newline may sit and still be preferred.
const NEWLINE_WINDOW: usize = 600;

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Each piece ends right after the last newline before the cap when one
/// falls within the last 600 characters, otherwise after the last
/// whitespace, otherwise exactly at the cap. Concatenating the pieces
/// gives back the input.
pub fn split_in_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut out = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let cut = split_point(rest, max_chars);
        let (head, tail) = rest.split_at(cut);
        out.push(head.to_string());
        rest = tail;
    }
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Byte offset to cut at; `s` holds more than `max_chars` characters.
fn split_point(s: &str, max_chars: usize) -> usize {
    let hard = s
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let window = &s[..hard];
    let window_start = max_chars.saturating_sub(NEWLINE_WINDOW);

    let mut last_newline = None;
    let mut last_space = None;
    for (pos, (idx, ch)) in window.char_indices().enumerate() {
        if ch == '\n' && pos >= window_start {
            last_newline = Some(idx + ch.len_utf8());
        } else if ch.is_whitespace() {
            last_space = Some(idx + ch.len_utf8());
        }
    }

    last_newline
        .or(last_space)
        .filter(|&cut| cut > 0)
        .unwrap_or(hard)
}
