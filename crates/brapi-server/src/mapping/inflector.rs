//! English plural/singular heuristics for BrAPI field names
//!
//! BrAPI parameter names drift between plural and singular forms across
//! releases (`germplasmDbId` vs `germplasmDbIds`). These helpers only need to
//! be good enough to line the two up; a miss simply means no fuzzy match.
//! Only the last camelCase word is inflected: `studyType` -> `studyTypes`.

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("analysis", "analyses"),
    ("datum", "data"),
    ("index", "indices"),
];

const UNCOUNTABLE: &[&str] = &["germplasm", "data", "species", "series", "information", "metadata"];

/// Plural form of `name`
pub fn plural(name: &str) -> String {
    let (head, word) = split_last_word(name);
    format!("{head}{}", plural_word(word))
}

/// Singular form of `name`
pub fn singular(name: &str) -> String {
    let (head, word) = split_last_word(name);
    format!("{head}{}", singular_word(word))
}

/// Split at the start of the last camelCase word
fn split_last_word(name: &str) -> (&str, &str) {
    let start = name
        .char_indices()
        .skip(1)
        .filter(|(_, c)| c.is_ascii_uppercase())
        .map(|(i, _)| i)
        .last()
        .unwrap_or(0);
    name.split_at(start)
}

fn is_uncountable(lower: &str) -> bool {
    UNCOUNTABLE.contains(&lower) || lower.ends_with("us")
}

fn plural_word(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if word.is_empty() || is_uncountable(&lower) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(s, _)| *s == lower) {
        return match_case(word, plural);
    }
    if IRREGULAR.iter().any(|(_, p)| *p == lower) {
        return word.to_string();
    }

    if lower.ends_with('y') && !ends_with_vowel_y(&lower) {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

fn singular_word(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if word.is_empty() || is_uncountable(&lower) {
        return word.to_string();
    }
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, p)| *p == lower) {
        return match_case(word, singular);
    }
    if IRREGULAR.iter().any(|(s, _)| *s == lower) {
        return word.to_string();
    }

    if lower.ends_with("ies") && lower.len() > 3 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if ["ses", "xes", "zes", "ches", "shes"].iter().any(|suffix| lower.ends_with(suffix)) {
        return word[..word.len() - 2].to_string();
    }
    if lower.ends_with('s') && !lower.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

fn ends_with_vowel_y(lower: &str) -> bool {
    let mut chars = lower.chars().rev();
    chars.next();
    matches!(chars.next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}

/// Carry the capitalisation of the first letter of `original` over
fn match_case(original: &str, replacement: &str) -> String {
    let upper = original.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    if !upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
