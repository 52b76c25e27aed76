//! Static spell-correction table applied to questions before retrieval.

/// Misspelling → canonical term. Keys are lowercase.
const CORRECTIONS: &[(&str, &str)] = &[
    ("rish", "risk"),
    ("facors", "factors"),
    ("facotr", "factor"),
    ("finacial", "financial"),
    ("operatons", "operations"),
    ("conditon", "condition"),
    ("enviroment", "environment"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corrected {
    pub text: String,
    /// `(original, replacement)` in order of appearance.
    pub replacements: Vec<(String, &'static str)>,
}

fn lookup(word: &str) -> Option<&'static str> {
    let lower = word.to_lowercase();
    CORRECTIONS
        .iter()
        .find(|(wrong, _)| *wrong == lower)
        .map(|(_, right)| *right)
}

/// Replace whole-word misspellings; everything else is kept byte for byte.
pub fn correct(query: &str) -> Corrected {
    let mut text = String::with_capacity(query.len());
    let mut replacements = Vec::new();
    let mut word = String::new();

    let mut flush = |word: &mut String, text: &mut String| {
        if word.is_empty() {
            return;
        }
        match lookup(word) {
            Some(right) => {
                text.push_str(right);
                replacements.push((word.clone(), right));
            }
            None => text.push_str(word),
        }
        word.clear();
    };

    for c in query.chars() {
        if c.is_alphanumeric() {
            word.push(c);
        } else {
            flush(&mut word, &mut text);
            text.push(c);
        }
    }
    flush(&mut word, &mut text);

    Corrected { text, replacements }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrects_known_misspellings() {
        let corrected = correct("What are the rish facors for Apple?");
        assert_eq!(corrected.text, "What are the risk factors for Apple?");
        assert_eq!(
            corrected.replacements,
            vec![("rish".to_string(), "risk"), ("facors".to_string(), "factors")]
        );
    }

    #[test]
    fn test_matching_ignores_case() {
        assert_eq!(correct("Finacial conditon").text, "financial condition");
    }

    #[test]
    fn test_only_whole_words_are_replaced() {
        let corrected = correct("rishi operatonsx");
        assert_eq!(corrected.text, "rishi operatonsx");
        assert!(corrected.replacements.is_empty());
    }

    #[test]
    fn test_punctuation_and_spacing_kept() {
        assert_eq!(correct("  enviroment,  (AAPL)  ").text, "  environment,  (AAPL)  ");
    }
}
