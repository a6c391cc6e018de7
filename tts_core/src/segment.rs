//! Text segmentation for progressive synthesis.
//!
//! Text is cut at sentence endings first, then at clause punctuation for
//! sentences that are still too long, and finally at word boundaries. Each
//! resulting segment becomes one engine call, so the first segment bounds
//! the time-to-first-audio of a response.

use serde::Serialize;

use crate::error::{Result, TtsError};

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];
const CLAUSE_SEPARATORS: [char; 3] = [',', ';', ':'];

/// One piece of the request text, synthesized by a single engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    pub index: usize,
    pub text: String,
    pub char_len: usize,
}

impl TextSegment {
    fn new(index: usize, text: &str) -> Self {
        Self {
            index,
            text: text.to_string(),
            char_len: char_len(text),
        }
    }
}

/// Split `text` into ordered segments of at most `max_length` characters.
///
/// Punctuation stays attached to the text before it. A mark only ends a
/// piece when it is followed by whitespace or the end of the text, which
/// keeps decimals and dotted abbreviations like `e.g.x` intact. Text without
/// usable punctuation is packed at word boundaries; a single token longer
/// than `max_length` is cut inside the token.
pub fn segment(text: &str, max_length: usize) -> Result<Vec<TextSegment>> {
    if max_length == 0 {
        return Err(TtsError::Validation(
            "max segment length must be at least 1".to_string(),
        ));
    }
    if text.trim().is_empty() {
        return Err(TtsError::Validation("Text cannot be empty".to_string()));
    }

    let mut pieces: Vec<&str> = Vec::new();
    for sentence in split_after(text, &SENTENCE_TERMINATORS) {
        if char_len(sentence) <= max_length {
            pieces.push(sentence);
            continue;
        }
        for clause in split_after(sentence, &CLAUSE_SEPARATORS) {
            if char_len(clause) <= max_length {
                pieces.push(clause);
            } else {
                pieces.extend(pack_words(clause, max_length));
            }
        }
    }

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| TextSegment::new(index, piece))
        .collect())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_trimmed<'a>(pieces: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        pieces.push(piece);
    }
}

/// Cut after every run of `marks` that is followed by whitespace or the end.
fn split_after<'a>(text: &'a str, marks: &[char]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !marks.contains(&c) {
            continue;
        }
        // "?!" and "..." stay with the sentence they close
        while let Some(&(_, next)) = chars.peek() {
            if marks.contains(&next) {
                chars.next();
            } else {
                break;
            }
        }
        match chars.peek() {
            Some(&(end, next)) if next.is_whitespace() => {
                push_trimmed(&mut pieces, &text[start..end]);
                start = end;
            }
            None => {
                push_trimmed(&mut pieces, &text[start..]);
                start = text.len();
            }
            _ => {}
        }
    }
    push_trimmed(&mut pieces, &text[start..]);
    pieces
}

/// Greedy word packing; falls back to a hard cut for oversized tokens.
fn pack_words(text: &str, max_length: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();

    while char_len(rest) > max_length {
        // byte offset just past `max_length` characters
        let limit = rest
            .char_indices()
            .nth(max_length)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        let cut = if rest[limit..].starts_with(char::is_whitespace) {
            limit
        } else {
            match rest[..limit].rfind(char::is_whitespace) {
                Some(p) if p > 0 => p,
                _ => limit,
            }
        };

        push_trimmed(&mut pieces, &rest[..cut]);
        rest = rest[cut..].trim_start();
    }
    push_trimmed(&mut pieces, rest);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(segments: &[TextSegment]) -> Vec<&str> {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    fn without_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_splits_on_sentence_endings() {
        let segments = segment("Hello world. How are you?", 250).unwrap();
        assert_eq!(texts(&segments), vec!["Hello world.", "How are you?"]);
        assert_eq!(segments[0].index, 0);
        assert_eq!(segments[1].index, 1);
        assert_eq!(segments[1].char_len, 12);
    }

    #[test]
    fn test_keeps_terminator_runs_together() {
        let segments = segment("Really?! Yes... Fine", 250).unwrap();
        assert_eq!(texts(&segments), vec!["Really?!", "Yes...", "Fine"]);
    }

    #[test]
    fn test_does_not_split_inside_numbers() {
        let segments = segment("Pi is 3.14 roughly. Next.", 250).unwrap();
        assert_eq!(texts(&segments), vec!["Pi is 3.14 roughly.", "Next."]);
    }

    #[test]
    fn test_clause_split_only_for_long_sentences() {
        let short = segment("One, two; three: four.", 250).unwrap();
        assert_eq!(short.len(), 1);

        let long = segment("One, two; three: four.", 10).unwrap();
        assert_eq!(texts(&long), vec!["One,", "two;", "three:", "four."]);
    }

    #[test]
    fn test_packs_unpunctuated_text_at_word_boundaries() {
        let segments = segment("alpha beta gamma delta epsilon", 11).unwrap();
        assert_eq!(texts(&segments), vec!["alpha beta", "gamma delta", "epsilon"]);
    }

    #[test]
    fn test_hard_cuts_oversized_token() {
        let segments = segment("abcdefghij", 4).unwrap();
        assert_eq!(texts(&segments), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_segments_respect_max_length() {
        let text = "This is a fairly long sentence without many breaks that keeps going \
                    and going, with a clause here; another there: and a supercalifragilistic \
                    word. Short one! Done?";
        for max in [1, 3, 8, 16, 40, 250] {
            let segments = segment(text, max).unwrap();
            for s in &segments {
                assert!(!s.text.is_empty());
                assert!(s.char_len <= max, "{:?} exceeds {}", s.text, max);
            }
        }
    }

    #[test]
    fn test_concatenation_preserves_characters() {
        let inputs = [
            "Hello world. How are you?",
            "  leading and trailing   ",
            "Wait... what?! Okay, fine; sure: go.",
            "no punctuation at all in this rather long line of words",
            "Ünïcödé text, with ümlauts. And more ß!",
        ];
        for text in inputs {
            for max in [1, 5, 12, 500] {
                let segments = segment(text, max).unwrap();
                let joined: String = segments.iter().map(|s| s.text.as_str()).collect();
                assert_eq!(without_whitespace(&joined), without_whitespace(text));
            }
        }
    }

    #[test]
    fn test_is_deterministic() {
        let text = "Same input, same output. Every time!";
        assert_eq!(segment(text, 10).unwrap(), segment(text, 10).unwrap());
    }

    #[test]
    fn test_empty_text_is_rejected() {
        assert!(matches!(segment("", 100), Err(TtsError::Validation(_))));
        assert!(matches!(segment("  \n\t ", 100), Err(TtsError::Validation(_))));
    }

    #[test]
    fn test_zero_max_length_is_rejected() {
        assert!(matches!(segment("Hello.", 0), Err(TtsError::Validation(_))));
    }

    #[test]
    fn test_punctuation_only_text_yields_a_segment() {
        let segments = segment("?!", 10).unwrap();
        assert_eq!(texts(&segments), vec!["?!"]);
    }
}
