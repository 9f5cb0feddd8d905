use super::{ModerationOracle, OracleError, Verdict};
use crate::models::Severity;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

/// Personal data that should not appear in a public post
static PII_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "pii:phone_number",
            Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("Phone regex pattern is valid"),
        ),
        (
            "pii:email_address",
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .expect("Email regex pattern is valid"),
        ),
        (
            "pii:card_number",
            Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b")
                .expect("Credit card regex pattern is valid"),
        ),
    ]
});

static REPEATED_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[!?]{4,}").expect("Punctuation regex pattern is valid"));

/// Local word-list and pattern classifier.
///
/// Word files hold one entry per line, `word` or `word|severity`; entries
/// without a severity count as `high`. Blank lines and `#` comments are
/// skipped. An entry of several words matches that phrase as consecutive
/// words, regardless of the spacing or punctuation between them.
pub struct RuleBasedOracle {
    sensitive_words: HashMap<String, Severity>,
}

impl RuleBasedOracle {
    pub fn new(words_file: impl AsRef<Path>) -> Result<Self, OracleError> {
        let content = fs::read_to_string(words_file.as_ref()).map_err(|e| {
            OracleError::Config(format!(
                "Failed to load sensitive words from {}: {}",
                words_file.as_ref().display(),
                e
            ))
        })?;

        Ok(Self {
            sensitive_words: Self::parse_words(&content)?,
        })
    }

    /// Oracle with patterns only, used when no word list is configured
    pub fn without_words() -> Self {
        Self {
            sensitive_words: HashMap::new(),
        }
    }

    pub fn with_words<'a>(words: impl IntoIterator<Item = (&'a str, Severity)>) -> Self {
        Self {
            sensitive_words: words
                .into_iter()
                .filter_map(|(w, s)| entry_key(w).map(|key| (key, s)))
                .collect(),
        }
    }

    fn parse_words(content: &str) -> Result<HashMap<String, Severity>, OracleError> {
        let mut words = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (word, severity) = match line.split_once('|') {
                Some((word, severity)) => (
                    word.trim(),
                    severity.trim().parse::<Severity>().map_err(OracleError::Config)?,
                ),
                None => (line, Severity::High),
            };
            if let Some(key) = entry_key(word) {
                words.insert(key, severity);
            }
        }
        Ok(words)
    }

    /// Classify one piece of text
    pub fn check(&self, text: &str) -> Verdict {
        if text.trim().is_empty() {
            return Verdict::clean();
        }

        let normalized = text.to_lowercase();
        let tokens: Vec<&str> = normalized.unicode_words().collect();
        let phrase = format!(" {} ", tokens.join(" "));
        let mut severity = Severity::None;
        let mut violations = Vec::new();

        let mut matched: Vec<(&String, &Severity)> = self
            .sensitive_words
            .iter()
            .filter(|(word, _)| {
                if word.contains(' ') {
                    phrase.contains(&format!(" {} ", word))
                } else {
                    tokens.contains(&word.as_str())
                }
            })
            .collect();
        matched.sort();
        for (word, word_severity) in matched {
            violations.push(format!("sensitive_word:{}", word));
            severity = severity.max(*word_severity);
            tracing::debug!(word = %word, "flagged for sensitive word");
        }

        for (tag, pattern) in PII_PATTERNS.iter() {
            if pattern.is_match(text) {
                violations.push(tag.to_string());
                severity = severity.max(Severity::Medium);
            }
        }

        if has_excessive_caps(text) {
            violations.push("spam:excessive_capitalization".to_string());
            severity = severity.max(Severity::Low);
        }

        if has_repeated_chars(text) {
            violations.push("spam:repeated_characters".to_string());
            severity = severity.max(Severity::Low);
        }

        if REPEATED_PUNCTUATION.is_match(text) {
            violations.push("spam:excessive_punctuation".to_string());
            severity = severity.max(Severity::Low);
        }

        Verdict::flagged(severity, violations)
    }
}

#[async_trait]
impl ModerationOracle for RuleBasedOracle {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(&self, title: &str, content: &str) -> Result<Verdict, OracleError> {
        Ok(self.check(&format!("{}\n{}", title, content)))
    }
}

/// Lower-cased words of a list entry joined by single spaces
fn entry_key(raw: &str) -> Option<String> {
    let key = raw
        .to_lowercase()
        .unicode_words()
        .collect::<Vec<_>>()
        .join(" ");
    (!key.is_empty()).then_some(key)
}

/// More than 70% upper-case letters, ignoring short texts
fn has_excessive_caps(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 10 {
        return false;
    }

    let caps = letters.iter().filter(|c| c.is_uppercase()).count();
    caps as f32 / letters.len() as f32 > 0.7
}

/// Five or more of the same character in a row ("soooooo")
fn has_repeated_chars(text: &str) -> bool {
    let mut previous = None;
    let mut run = 0;
    for c in text.chars() {
        if Some(c) == previous {
            run += 1;
            if run >= 5 && !c.is_whitespace() {
                return true;
            }
        } else {
            previous = Some(c);
            run = 1;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_words_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "badword").unwrap();
        writeln!(file, "threaten|critical").unwrap();
        writeln!(file, "# Comment line").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "rude | low").unwrap();
        file
    }

    #[test]
    fn test_load_words_with_severities() {
        let file = create_test_words_file();
        let oracle = RuleBasedOracle::new(file.path()).unwrap();

        assert_eq!(oracle.sensitive_words.len(), 3);
        assert_eq!(oracle.sensitive_words["badword"], Severity::High);
        assert_eq!(oracle.sensitive_words["threaten"], Severity::Critical);
        assert_eq!(oracle.sensitive_words["rude"], Severity::Low);
    }

    #[test]
    fn test_bad_severity_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "word|catastrophic").unwrap();
        assert!(matches!(
            RuleBasedOracle::new(file.path()),
            Err(OracleError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(matches!(
            RuleBasedOracle::new("/nonexistent/words.txt"),
            Err(OracleError::Config(_))
        ));
    }

    #[test]
    fn test_safe_text() {
        let oracle = RuleBasedOracle::with_words([("badword", Severity::High)]);
        let verdict = oracle.check("Notes from the library study group");
        assert!(!verdict.has_violations);
        assert_eq!(verdict.severity, Severity::None);
    }

    #[test]
    fn test_word_match_is_whole_word() {
        let oracle = RuleBasedOracle::with_words([("ass", Severity::Medium)]);
        assert!(!oracle.check("Our class assignment is due").has_violations);
        assert!(oracle.check("what an ass").has_violations);
    }

    #[test]
    fn test_multi_word_entry_matches_phrase() {
        let oracle = RuleBasedOracle::with_words([("kill  Yourself", Severity::Critical)]);

        let verdict = oracle.check("Nobody should tell anyone to kill, yourself!");
        assert_eq!(verdict.severity, Severity::Critical);
        assert_eq!(verdict.violations, vec!["sensitive_word:kill yourself"]);

        // both words present but not as a phrase
        assert!(!oracle.check("yourself first, then kill time").has_violations);
        assert!(!oracle.check("overkill yourselves").has_violations);
    }

    #[test]
    fn test_multi_word_entry_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "hate speech|high").unwrap();
        let oracle = RuleBasedOracle::new(file.path()).unwrap();

        assert_eq!(oracle.sensitive_words["hate speech"], Severity::High);
        assert_eq!(
            oracle.check("A talk on Hate Speech laws").severity,
            Severity::High
        );
    }

    #[test]
    fn test_highest_severity_wins() {
        let oracle = RuleBasedOracle::with_words([
            ("rude", Severity::Low),
            ("threaten", Severity::Critical),
        ]);
        let verdict = oracle.check("rude people threaten others");
        assert_eq!(verdict.severity, Severity::Critical);
        assert_eq!(verdict.violations.len(), 2);
    }

    #[test]
    fn test_pii_is_medium() {
        let oracle = RuleBasedOracle::without_words();
        let verdict = oracle.check("Call me at 555-123-4567 after the lecture");
        assert_eq!(verdict.severity, Severity::Medium);
        assert!(verdict.violations.contains(&"pii:phone_number".to_string()));
    }

    #[test]
    fn test_spam_signals_are_low() {
        let oracle = RuleBasedOracle::without_words();

        let caps = oracle.check("HELLO THIS IS ALL CAPS");
        assert_eq!(caps.severity, Severity::Low);
        assert!(caps
            .violations
            .contains(&"spam:excessive_capitalization".to_string()));

        let repeated = oracle.check("soooooo good");
        assert!(repeated
            .violations
            .contains(&"spam:repeated_characters".to_string()));

        let punctuation = oracle.check("really?!?!");
        assert!(punctuation
            .violations
            .contains(&"spam:excessive_punctuation".to_string()));
    }

    #[tokio::test]
    async fn test_classify_checks_title_and_content() {
        let oracle = RuleBasedOracle::with_words([("badword", Severity::High)]);
        let verdict = oracle.classify("A badword title", "clean body").await.unwrap();
        assert_eq!(verdict.severity, Severity::High);
    }
}
