//! Label normalization for entity reconciliation
//!
//! Source workbooks spell the same plant a dozen ways: "Charcani IV",
//! "CHARCANI 4", "C.H. CHARCANI IV (kWh)". Normalization folds all of
//! them onto one comparison key before the registry lookup.

/// Spanish diacritic folding table
const DIACRITICS: &[(char, char)] = &[
    ('á', 'a'),
    ('é', 'e'),
    ('í', 'i'),
    ('ó', 'o'),
    ('ú', 'u'),
    ('ü', 'u'),
    ('ñ', 'n'),
    ('Á', 'A'),
    ('É', 'E'),
    ('Í', 'I'),
    ('Ó', 'O'),
    ('Ú', 'U'),
    ('Ü', 'U'),
    ('Ñ', 'N'),
];

/// Trailing roman numerals folded to arabic digits
const ROMAN_NUMERALS: &[(&str, &str)] = &[
    ("I", "1"),
    ("II", "2"),
    ("III", "3"),
    ("IV", "4"),
    ("V", "5"),
    ("VI", "6"),
    ("VII", "7"),
    ("VIII", "8"),
    ("IX", "9"),
    ("X", "10"),
];

/// Normalize a label for comparison: strip Spanish diacritics, replace
/// every non-alphanumeric character with a space, uppercase, collapse
/// whitespace.
pub fn normalize_label(value: &str) -> String {
    let folded: String = value
        .chars()
        .map(|ch| {
            DIACRITICS
                .iter()
                .find(|(from, _)| *from == ch)
                .map(|(_, to)| *to)
                .unwrap_or(ch)
        })
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { ' ' })
        .collect();
    folded
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalize an already-normalized plant label.
///
/// Folds the "C T" / "C H" plant-type prefixes left behind by dotted
/// abbreviations and rewrites a trailing roman numeral I-X to its digit,
/// so "C.H. CHARCANI IV" and "CHARCANI 4" land on comparable keys.
pub fn canonicalize_plant_label(normalized: &str) -> String {
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();

    if tokens.len() >= 2 {
        let fused = match (tokens[0], tokens[1]) {
            ("C", "T") => Some("CT"),
            ("C", "H") => Some("CH"),
            _ => None,
        };
        if let Some(prefix) = fused {
            tokens.splice(0..2, [prefix]);
        }
    }

    if let Some(last) = tokens.last_mut() {
        if let Some((_, digit)) = ROMAN_NUMERALS.iter().find(|(roman, _)| roman == last) {
            *last = digit;
        }
    }

    tokens.join(" ")
}

/// Full normalization pipeline used for registry keys and lookups
pub fn entity_key(label: &str) -> String {
    canonicalize_plant_label(&normalize_label(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_diacritics_and_punctuation() {
        assert_eq!(normalize_label("Río Chili"), "RIO CHILI");
        assert_eq!(normalize_label("C.T. CHILINA"), "C T CHILINA");
        assert_eq!(normalize_label("  charcani   v "), "CHARCANI V");
        assert_eq!(normalize_label("AÑO"), "ANO");
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_label("C.H. Charcani IV (kWh)");
        assert_eq!(normalize_label(&once), once);
    }

    #[test]
    fn test_canonicalize_folds_plant_type_prefix() {
        assert_eq!(canonicalize_plant_label("C T CHILINA"), "CT CHILINA");
        assert_eq!(canonicalize_plant_label("C H CHARCANI V"), "CH CHARCANI 5");
        assert_eq!(canonicalize_plant_label("CHILINA"), "CHILINA");
    }

    #[test]
    fn test_canonicalize_trailing_roman_numerals() {
        assert_eq!(canonicalize_plant_label("CHARCANI IV"), "CHARCANI 4");
        assert_eq!(canonicalize_plant_label("CHARCANI VIII"), "CHARCANI 8");
        // Only the trailing token is rewritten
        assert_eq!(canonicalize_plant_label("V CHARCANI"), "V CHARCANI");
    }

    #[test]
    fn test_entity_key_unifies_spellings() {
        assert_eq!(entity_key("Charcani IV"), entity_key("CHARCANI 4"));
        assert_eq!(entity_key("C.H. CHARCANI IV"), "CH CHARCANI 4");
        assert_eq!(entity_key("C.T. Chilina"), "CT CHILINA");
    }
}
