//! Banned-word masking, applied to message content before it is stored or
//! delivered.
//!
//! Each banned word is applied independently, in list order: every
//! case-insensitive occurrence is replaced by a run of `*` of the same
//! character length. There is no word-boundary logic, so a banned word
//! inside a longer word is masked too, and nested words can compound
//! across passes. Both behaviors are long-standing and kept as-is.

/// Apply every banned word to `text`, returning the masked copy.
pub fn apply(text: &str, words: &[String]) -> String {
    let mut filtered = text.to_string();
    for word in words {
        filtered = mask_word(&filtered, word);
    }
    filtered
}

fn mask_word(text: &str, word: &str) -> String {
    let needle: Vec<char> = word.chars().collect();
    if needle.is_empty() {
        return text.to_string();
    }

    let haystack: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < haystack.len() {
        if matches_at(&haystack, i, &needle) {
            out.extend(std::iter::repeat('*').take(needle.len()));
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

fn matches_at(haystack: &[char], at: usize, needle: &[char]) -> bool {
    haystack.len() - at >= needle.len()
        && haystack[at..at + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.to_lowercase().eq(b.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn masks_every_occurrence_with_matching_length() {
        let out = apply("crab soup with crab legs", &words(&["crab"]));
        assert_eq!(out, "**** soup with **** legs");
    }

    #[test]
    fn matching_ignores_case() {
        let out = apply("Crab CRAB cRaB", &words(&["crab"]));
        assert_eq!(out, "**** **** ****");
    }

    #[test]
    fn masks_inside_longer_words() {
        // No word boundaries: "class" contains "ass".
        let out = apply("the class listens", &words(&["ass"]));
        assert_eq!(out, "the cl*** listens");
    }

    #[test]
    fn words_apply_independently_in_order() {
        let out = apply("abcd", &words(&["ab", "cd"]));
        assert_eq!(out, "****");
    }

    #[test]
    fn unmatched_text_passes_through() {
        let out = apply("perfectly fine", &words(&["crab"]));
        assert_eq!(out, "perfectly fine");
    }

    #[test]
    fn empty_word_list_is_identity() {
        assert_eq!(apply("anything", &[]), "anything");
    }

    #[test]
    fn empty_words_are_skipped() {
        assert_eq!(apply("anything", &words(&[""])), "anything");
    }

    #[test]
    fn masking_is_idempotent() {
        let list = words(&["crab", "ass"]);
        let once = apply("crab class", &list);
        assert_eq!(apply(&once, &list), once);
    }

    #[test]
    fn multibyte_content_keeps_character_lengths() {
        let out = apply("qadağan söz", &words(&["qadağan"]));
        assert_eq!(out, "******* söz");
    }
}
