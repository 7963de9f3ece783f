//! Prompt templates

use crate::dataset::{IdiomItem, Letter};

/// Single multiple-choice prompt listing the four definitions as A-D
pub fn choice_prompt(item: &IdiomItem) -> String {
    let mut prompt = String::from(
        "Choose the correct definition for the given metaphorical expression by responding \
         with only a single letter representing your choice (A, B, C, or D).\n",
    );
    prompt.push_str(&format!("Sentence: {}\n", item.idiom()));
    for letter in Letter::ALL {
        prompt.push_str(&format!("Option {}: {}\n", letter, item.definition(letter).text));
    }
    prompt.push_str("Your response should be exactly one letter: A, B, C, or D.");
    prompt
}

/// One yes/no question about one candidate definition
pub fn verdict_prompt(idiom: &str, definition: &str) -> String {
    format!("Does the expression {} mean: {}? (yes/no)", idiom, definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_prompt_lists_options_in_order() {
        let item = IdiomItem::from_options(
            1,
            "have en høne at plukke med nogen",
            ["være vred på nogen", "spise kylling", "arbejde på en gård", "være sulten"],
            Letter::A,
        )
        .unwrap();
        let prompt = choice_prompt(&item);

        assert!(prompt.contains("Sentence: have en høne at plukke med nogen\n"));
        let a = prompt.find("Option A: være vred på nogen").unwrap();
        let d = prompt.find("Option D: være sulten").unwrap();
        assert!(a < d);
        assert!(prompt.ends_with("exactly one letter: A, B, C, or D."));
    }

    #[test]
    fn test_verdict_prompt() {
        assert_eq!(
            verdict_prompt("slå til", "acceptere et tilbud"),
            "Does the expression slå til mean: acceptere et tilbud? (yes/no)"
        );
    }
}
