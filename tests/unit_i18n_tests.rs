//! # I18n Unit Tests / I18n 单元测试
//!
//! Locale matching against the bundled translations.
//!
//! 针对内置翻译的语言匹配。

use case_runner::match_locale;

#[test]
fn test_exact_locale() {
    assert_eq!(match_locale("en"), "en");
    assert_eq!(match_locale("zh-CN"), "zh-CN");
}

#[test]
fn test_locale_matching_ignores_case() {
    assert_eq!(match_locale("ZH-cn"), "zh-CN");
}

#[test]
fn test_language_code_fallback() {
    assert_eq!(match_locale("en-US"), "en");
    assert_eq!(match_locale("en_GB"), "en");
}

#[test]
fn test_unknown_locale_falls_back_to_english() {
    assert_eq!(match_locale("fr-FR"), "en");
    assert_eq!(match_locale("invalid-lang"), "en");
    assert_eq!(match_locale(""), "en");
}
