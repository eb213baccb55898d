//! Target-language gate
//!
//! Lexical heuristic deciding whether a transcript is Spanish. No model, no I/O.

/// Characters that only show up in Spanish text
const SPANISH_CHARS: &[char] = &['¿', '¡', 'ñ', 'á', 'é', 'í', 'ó', 'ú', 'ü'];

/// Common Spanish words a shopper is likely to say
///
/// Multi-word entries match as consecutive words.
const SPANISH_WORDS: &[&str] = &[
    // Greetings and goodbyes
    "hola",
    "buenos",
    "buenas",
    "adiós",
    "adios",
    "hasta luego",
    // Question words
    "dónde",
    "donde",
    "cuánto",
    "cuanto",
    "cuánta",
    "cuanta",
    "cuántos",
    "cuantos",
    "qué",
    "cómo",
    "cuál",
    "cual",
    // Shopping verbs
    "está",
    "esta",
    "están",
    "estan",
    "necesito",
    "quiero",
    "busco",
    "tienen",
    "cuesta",
    // Politeness
    "gracias",
    "disculpe",
    "perdón",
    "perdon",
    "por favor",
    "señor",
    "señora",
];

/// Verdict derived from a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageVerdict {
    pub is_target_language: bool,
}

/// Classifies text as target language or not
#[derive(Debug, Clone)]
pub struct LanguageGate {
    language_code: String,
    chars: &'static [char],
    words: &'static [&'static str],
}

impl Default for LanguageGate {
    fn default() -> Self {
        Self::spanish()
    }
}

impl LanguageGate {
    /// Gate for Spanish (`es-ES`)
    #[must_use]
    pub fn spanish() -> Self {
        Self {
            language_code: "es-ES".to_string(),
            chars: SPANISH_CHARS,
            words: SPANISH_WORDS,
        }
    }

    /// Language code this gate recognizes
    #[must_use]
    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    /// Classify `text`
    #[must_use]
    pub fn verdict(&self, text: &str) -> LanguageVerdict {
        LanguageVerdict {
            is_target_language: self.is_target_language(text),
        }
    }

    /// True if `text` has a diagnostic character or a listed word
    ///
    /// Case-insensitive and pure.
    #[must_use]
    pub fn is_target_language(&self, text: &str) -> bool {
        let lower = text.to_lowercase();

        if lower.chars().any(|c| self.chars.contains(&c)) {
            return true;
        }

        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        self.words.iter().any(|entry| {
            let parts: Vec<&str> = entry.split(' ').collect();
            tokens.windows(parts.len()).any(|window| window == parts.as_slice())
        })
    }
}

/// Spanish check with the default gate
#[must_use]
pub fn is_spanish(text: &str) -> bool {
    LanguageGate::spanish().is_target_language(text)
}
