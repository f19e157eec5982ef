//! Pinyin tokenization and alignment.
//!
//! Transcriptions coming back from the tutor (or typed by a learner) are loose:
//! tone marks and tone digits may be mixed, syllables may be glued together
//! with apostrophes or hyphens, and punctuation is copied through verbatim.
//! The helpers here turn such a string into syllable tokens and map them onto
//! the Hanzi of the sentence they describe, one syllable per ideograph.

/// Tone-marked vowels (and syllabic nasals) grouped by tone, tones 1 to 4.
/// The trailing combining mark covers decomposed input.
const TONE_MARKS: [(u8, &str); 4] = [
    (1, "āēīōūǖĀĒĪŌŪǕ\u{0304}"),
    (2, "áéíóúǘÁÉÍÓÚǗńḿŃḾ\u{0301}"),
    (3, "ǎěǐǒǔǚǍĚǏǑǓǙňŇ\u{030C}"),
    (4, "àèìòùǜÀÈÌÒÙǛǹǸ\u{0300}"),
];

/// Neutral tone.
pub const NEUTRAL_TONE: u8 = 5;

/// True if `ch` is a CJK ideograph (unified, extensions A–E, compatibility).
pub fn is_han(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{20000}'..='\u{2A6DF}'
        | '\u{2A700}'..='\u{2B73F}'
        | '\u{2B740}'..='\u{2B81F}'
        | '\u{2B820}'..='\u{2CEAF}'
        | '\u{F900}'..='\u{FAFF}')
}

/// Letters that can be part of a syllable, including combining diacritics.
fn is_syllable_char(ch: char) -> bool {
    ch.is_alphabetic() || matches!(ch, '\u{0300}'..='\u{036F}')
}

/// Splits a transcription into syllable tokens.
///
/// A token is a maximal run of letters optionally followed by a single tone
/// digit `0`–`5`. Whitespace, apostrophes, hyphens and every other non-letter
/// only separate tokens and never appear inside one.
///
/// ```
/// use caatuu_core::pinyin::tokenize_pinyin;
///
/// assert_eq!(tokenize_pinyin("xī'ān, ni3hao3!"), vec!["xī", "ān", "ni3", "hao3"]);
/// ```
pub fn tokenize_pinyin(transcription: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in transcription.chars() {
        if is_syllable_char(ch) {
            current.push(ch);
        } else if !current.is_empty() && matches!(ch, '0'..='5') {
            current.push(ch);
            tokens.push(std::mem::take(&mut current));
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Maps the syllables of `transcription` onto the characters of `text`.
///
/// The result has exactly one entry per character of `text`. Ideographs take
/// the next unused syllable (or an empty string once syllables run out); any
/// other character gets an empty string and consumes nothing.
pub fn align_to_text(text: &str, transcription: &str) -> Vec<String> {
    let mut tokens = tokenize_pinyin(transcription).into_iter();
    text.chars()
        .map(|ch| {
            if is_han(ch) {
                tokens.next().unwrap_or_default()
            } else {
                String::new()
            }
        })
        .collect()
}

/// Tone number (1–5) of a single syllable.
///
/// A trailing tone digit wins (`0` and `5` both mean neutral); otherwise the
/// first tone mark found decides. Anything else is neutral.
pub fn tone_of(syllable: &str) -> u8 {
    if let Some(digit) = syllable.chars().last().and_then(|c| c.to_digit(10)) {
        match digit {
            0 | 5 => return NEUTRAL_TONE,
            1..=4 => return digit as u8,
            _ => {}
        }
    }

    TONE_MARKS
        .iter()
        .find(|(_, marks)| syllable.chars().any(|c| marks.contains(c)))
        .map(|(tone, _)| *tone)
        .unwrap_or(NEUTRAL_TONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_on_separators() {
        assert_eq!(
            tokenize_pinyin("nǐ hǎo"),
            vec!["nǐ".to_string(), "hǎo".to_string()]
        );
        assert_eq!(tokenize_pinyin("xī'ān"), vec!["xī", "ān"]);
        assert_eq!(tokenize_pinyin("yī-qǐ"), vec!["yī", "qǐ"]);
        assert_eq!(tokenize_pinyin("  "), Vec::<String>::new());
        assert_eq!(tokenize_pinyin(""), Vec::<String>::new());
    }

    #[test]
    fn test_tokenize_keeps_one_trailing_tone_digit() {
        assert_eq!(tokenize_pinyin("ni3hao3"), vec!["ni3", "hao3"]);
        assert_eq!(tokenize_pinyin("ma0"), vec!["ma0"]);
        // A second digit cannot start a token, and 6-9 are not tones.
        assert_eq!(tokenize_pinyin("ni33 ta7"), vec!["ni3", "ta"]);
        assert_eq!(tokenize_pinyin("2025 nian2"), vec!["nian2"]);
    }

    #[test]
    fn test_tokenize_handles_umlaut_and_decomposed_marks() {
        assert_eq!(tokenize_pinyin("lǜ lv4 nü3"), vec!["lǜ", "lv4", "nü3"]);
        assert_eq!(tokenize_pinyin("ma\u{0301}"), vec!["ma\u{0301}"]);
    }

    #[test]
    fn test_tokens_never_contain_separators() {
        let inputs = [
            "wǒ men yī qǐ xué xí ba !",
            "zhōng-guó'rén 2025！",
            "  a''b--c  d3e4 f9g ",
            "jīn tiān,tiān qì hěn hǎo。",
            "'-'- -",
        ];
        for input in inputs {
            for token in tokenize_pinyin(input) {
                assert!(!token.is_empty());
                assert!(
                    !token.contains([' ', '\'', '-']),
                    "token {token:?} from {input:?}"
                );
            }
        }
    }

    #[test]
    fn test_align_one_syllable_per_ideograph() {
        let aligned = align_to_text("你好！", "nǐ hǎo !");
        assert_eq!(aligned, vec!["nǐ", "hǎo", ""]);
    }

    #[test]
    fn test_align_skips_punctuation_and_latin() {
        let aligned = align_to_text("他昨天去了北京。", "tā zuó tiān qù le běi jīng.");
        assert_eq!(
            aligned,
            vec!["tā", "zuó", "tiān", "qù", "le", "běi", "jīng", ""]
        );

        let mixed = align_to_text("我有3个apple", "wǒ yǒu gè");
        assert_eq!(mixed, vec!["wǒ", "yǒu", "", "gè", "", "", "", "", ""]);
    }

    #[test]
    fn test_align_exhausted_tokens_yield_empty() {
        assert_eq!(align_to_text("今天天气", "jīn tiān"), vec!["jīn", "tiān", "", ""]);
        assert_eq!(align_to_text("好", ""), vec![""]);
        assert!(align_to_text("", "hǎo").is_empty());
    }

    #[test]
    fn test_align_length_matches_char_count() {
        let cases = [
            ("你吃饭了吗？", "nǐ chī fàn le ma ?"),
            ("abc", "nǐ"),
            ("我们一起学习吧！", "wǒ men"),
            ("𠀀x", "a b c"),
        ];
        for (text, py) in cases {
            let aligned = align_to_text(text, py);
            assert_eq!(aligned.len(), text.chars().count());
            for (ch, syllable) in text.chars().zip(&aligned) {
                if !is_han(ch) {
                    assert!(syllable.is_empty(), "{ch} should not get a syllable");
                }
            }
        }
    }

    #[test]
    fn test_tone_prefers_digits() {
        assert_eq!(tone_of("ma1"), 1);
        assert_eq!(tone_of("ma2"), 2);
        assert_eq!(tone_of("ma3"), 3);
        assert_eq!(tone_of("ma4"), 4);
        assert_eq!(tone_of("ma5"), 5);
        assert_eq!(tone_of("ma0"), 5);
        // The digit overrides a conflicting mark.
        assert_eq!(tone_of("mā4"), 4);
    }

    #[test]
    fn test_tone_from_marks() {
        assert_eq!(tone_of("zhōng"), 1);
        assert_eq!(tone_of("guó"), 2);
        assert_eq!(tone_of("hǎo"), 3);
        assert_eq!(tone_of("qù"), 4);
        assert_eq!(tone_of("lǜ"), 4);
        assert_eq!(tone_of("ń"), 2);
        assert_eq!(tone_of("ma\u{030C}"), 3);
        assert_eq!(tone_of("le"), 5);
    }

    #[test]
    fn test_tone_is_total() {
        for input in ["", "!", "9", "ma9", "。", "ABC", "x7y", "你"] {
            let tone = tone_of(input);
            assert!((1..=5).contains(&tone), "{input:?} -> {tone}");
        }
    }

    #[test]
    fn test_is_han_ranges() {
        assert!(is_han('中'));
        assert!(is_han('㐀'));
        assert!(is_han('𠀀'));
        assert!(!is_han('。'));
        assert!(!is_han('a'));
        assert!(!is_han('3'));
    }
}
