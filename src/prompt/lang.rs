/// Prompt locale, chosen per query from the question text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    /// Any CJK unified ideograph marks the text as Chinese.
    pub fn detect(text: &str) -> Self {
        if text.chars().any(is_cjk_ideograph) {
            Language::Zh
        } else {
            Language::En
        }
    }
}

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_text_is_zh() {
        assert_eq!(Language::detect("你好"), Language::Zh);
    }

    #[test]
    fn ascii_text_is_en() {
        assert_eq!(Language::detect("hello"), Language::En);
    }

    #[test]
    fn mixed_text_with_one_ideograph_is_zh() {
        assert_eq!(Language::detect("What does 所有权 mean in Rust?"), Language::Zh);
    }

    #[test]
    fn kana_only_is_not_zh() {
        assert_eq!(Language::detect("カタカナ"), Language::En);
    }

    #[test]
    fn range_boundaries() {
        assert_eq!(Language::detect("\u{4E00}"), Language::Zh);
        assert_eq!(Language::detect("\u{9FFF}"), Language::Zh);
        assert_eq!(Language::detect("\u{4DFF}"), Language::En);
        assert_eq!(Language::detect(""), Language::En);
    }
}
