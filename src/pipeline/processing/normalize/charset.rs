//! Character classes used by the Phase 1 filters.

pub fn is_hiragana(c: char) -> bool {
    ('\u{3041}'..='\u{309F}').contains(&c)
}

pub fn is_katakana(c: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&c)
        || ('\u{31F0}'..='\u{31FF}').contains(&c)
        || ('\u{FF66}'..='\u{FF9F}').contains(&c)
}

pub fn is_kanji(c: char) -> bool {
    matches!(c, '\u{3005}' | '\u{3007}')
        || ('\u{4E00}'..='\u{9FFF}').contains(&c)
        || ('\u{3400}'..='\u{4DBF}').contains(&c)
        || ('\u{F900}'..='\u{FAFF}').contains(&c)
        || ('\u{20000}'..='\u{2A6DF}').contains(&c)
}

/// CJK symbols and punctuation block (、。「」 and friends)
pub fn is_japanese_punctuation(c: char) -> bool {
    ('\u{3000}'..='\u{303F}').contains(&c)
}

pub fn is_japanese(c: char) -> bool {
    is_hiragana(c) || is_katakana(c) || is_kanji(c) || is_japanese_punctuation(c)
}

/// Characters that count against the non-Japanese ratio: letters and
/// symbols from other scripts. ASCII digits and punctuation are neutral.
pub fn is_foreign(c: char) -> bool {
    !(c.is_whitespace() || c.is_ascii_digit() || c.is_ascii_punctuation() || is_japanese(c))
}

/// ASCII symbols that rarely appear in running Japanese prose
pub fn is_special_symbol(c: char) -> bool {
    "!@#$%^&*()_+-=[]{}|;:,.<>?/~`".contains(c)
}

/// Characters that may close a sentence, including closing brackets
/// that commonly follow the final punctuation
pub fn is_sentence_end(c: char) -> bool {
    matches!(c, '。' | '!' | '?' | '」' | '』' | ')' | '…' | '.')
}

/// Characters that split text into sentences
pub fn is_sentence_delimiter(c: char) -> bool {
    matches!(c, '。' | '!' | '?' | '\n')
}
