//! Response normalization: free-form model text to a closed label set
//!
//! Normalization is total. Text without a recognized token, or with two
//! different recognized tokens, yields the undetermined value instead of an
//! error, so ambiguous output never counts as a correct answer.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataset::Letter;

/// Evaluation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One query per idiom listing all four definitions
    MultipleChoice,
    /// Four yes/no queries per idiom, one per definition
    YesNo,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::MultipleChoice => "multiple_choice",
            Mode::YesNo => "yes_no",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "multiple_choice" | "mc" | "choice" => Ok(Mode::MultipleChoice),
            "yes_no" | "yesno" => Ok(Mode::YesNo),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

/// Predicted label in multiple-choice form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Answer {
    Letter(Letter),
    Undetermined,
}

impl Answer {
    pub fn letter(&self) -> Option<Letter> {
        match self {
            Answer::Letter(l) => Some(*l),
            Answer::Undetermined => None,
        }
    }

    pub fn is_determined(&self) -> bool {
        matches!(self, Answer::Letter(_))
    }
}

impl From<Letter> for Answer {
    fn from(letter: Letter) -> Self {
        Answer::Letter(letter)
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Letter(l) => f.write_str(l.as_str()),
            Answer::Undetermined => f.write_str("UNDETERMINED"),
        }
    }
}

impl FromStr for Answer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("UNDETERMINED") || s.eq_ignore_ascii_case("ERROR") {
            return Ok(Answer::Undetermined);
        }
        // older stores wrote the 0-based definition index
        if let Ok(index) = s.parse::<usize>() {
            return Letter::from_index(index)
                .map(Answer::Letter)
                .ok_or_else(|| format!("Label index out of range: {}", index));
        }
        s.parse::<Letter>().map(Answer::Letter)
    }
}

/// Answer to one yes/no question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Yes,
    No,
    Undetermined,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Yes => "YES",
            Verdict::No => "NO",
            Verdict::Undetermined => "UNDETERMINED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "YES" | "1" => Ok(Verdict::Yes),
            "NO" | "0" => Ok(Verdict::No),
            "UNDETERMINED" | "" => Ok(Verdict::Undetermined),
            other => Err(format!("Not a verdict: {}", other)),
        }
    }
}

/// Output of [`normalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Choice(Answer),
    Verdict(Verdict),
}

/// Normalize raw model text for the given mode
pub fn normalize(raw: &str, mode: Mode) -> Label {
    match mode {
        Mode::MultipleChoice => Label::Choice(normalize_choice(raw)),
        Mode::YesNo => Label::Verdict(normalize_verdict(raw)),
    }
}

fn letter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `\b` is Unicode-aware, so letters inside Danish words never match
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b([abcd])\b").expect("valid letter pattern"))
}

fn verdict_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(ja|nej|yes|no)\b").expect("valid verdict pattern"))
}

/// Recognize a standalone A-D letter
pub fn normalize_choice(raw: &str) -> Answer {
    let letters = letter_pattern()
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse::<Letter>().ok());

    match single_distinct(letters) {
        Some(letter) => Answer::Letter(letter),
        None => Answer::Undetermined,
    }
}

/// Recognize "ja"/"nej" (and the English "yes"/"no" the prompt is phrased in)
pub fn normalize_verdict(raw: &str) -> Verdict {
    let verdicts = verdict_pattern()
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| match m.as_str().to_lowercase().as_str() {
            "ja" | "yes" => Verdict::Yes,
            _ => Verdict::No,
        });

    single_distinct(verdicts).unwrap_or(Verdict::Undetermined)
}

/// The value all items agree on, or `None` when empty or conflicting
fn single_distinct<T: PartialEq>(mut values: impl Iterator<Item = T>) -> Option<T> {
    let first = values.next()?;
    if values.all(|v| v == first) {
        Some(first)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_with_explanation() {
        assert_eq!(normalize_choice("Svaret er B."), Answer::Letter(Letter::B));
        assert_eq!(normalize_choice("  c"), Answer::Letter(Letter::C));
        assert_eq!(normalize_choice("(D)"), Answer::Letter(Letter::D));
        assert_eq!(normalize_choice("A) at være sulten"), Answer::Letter(Letter::A));
    }

    #[test]
    fn test_choice_ambiguous_or_missing() {
        assert_eq!(normalize_choice("Jeg tror det er A eller B"), Answer::Undetermined);
        assert_eq!(normalize_choice("Det kan jeg ikke svare på"), Answer::Undetermined);
        assert_eq!(normalize_choice(""), Answer::Undetermined);
        // letters inside words are not answers
        assert_eq!(normalize_choice("Bæredygtig"), Answer::Undetermined);
    }

    #[test]
    fn test_choice_repeated_same_letter() {
        assert_eq!(normalize_choice("B. Ja, B er rigtigt"), Answer::Letter(Letter::B));
    }

    #[test]
    fn test_verdicts() {
        assert_eq!(normalize_verdict("Ja."), Verdict::Yes);
        assert_eq!(normalize_verdict("NEJ"), Verdict::No);
        assert_eq!(normalize_verdict(" yes"), Verdict::Yes);
        assert_eq!(normalize_verdict("måske"), Verdict::Undetermined);
        assert_eq!(normalize_verdict("Ja og nej"), Verdict::Undetermined);
        // "jakke" and "nejsiger" contain tokens only as prefixes
        assert_eq!(normalize_verdict("jakke nejsiger"), Verdict::Undetermined);
    }

    #[test]
    fn test_normalize_dispatches_on_mode() {
        assert_eq!(
            normalize("Svaret er B.", Mode::MultipleChoice),
            Label::Choice(Answer::Letter(Letter::B))
        );
        assert_eq!(normalize("Ja.", Mode::YesNo), Label::Verdict(Verdict::Yes));
        assert_eq!(normalize("måske", Mode::YesNo), Label::Verdict(Verdict::Undetermined));
    }

    #[test]
    fn test_answer_round_trips_through_text() {
        assert_eq!("UNDETERMINED".parse::<Answer>().unwrap(), Answer::Undetermined);
        assert_eq!("2".parse::<Answer>().unwrap(), Answer::Letter(Letter::C));
        assert_eq!(Answer::Letter(Letter::A).to_string(), "A");
        assert!("Z".parse::<Answer>().is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("yes-no".parse::<Mode>().unwrap(), Mode::YesNo);
        assert_eq!("multiple_choice".parse::<Mode>().unwrap(), Mode::MultipleChoice);
        assert!("essay".parse::<Mode>().is_err());
    }
}
