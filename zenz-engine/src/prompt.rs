//! Prompt assembly in the zenz tagged format
//!
//! A prompt is a flat string where private-use sentinel characters delimit
//! each field:
//!
//! ```text
//! [PROFILE p][TOPIC t][STYLE s][PREFERENCE f][CONTEXT left] INPUT reading OUTPUT
//! ```
//!
//! Bracketed segments are omitted when their field is empty. Generation
//! begins immediately after the output tag.

use serde::{Deserialize, Serialize};

/// Start of the reading to convert
pub const INPUT_START_TAG: char = '\u{ee00}';
/// Start of the model output
pub const OUTPUT_START_TAG: char = '\u{ee01}';
/// Start of the left-side context
pub const CONTEXT_START_TAG: char = '\u{ee02}';
/// Start of the user profile condition
pub const PROFILE_START_TAG: char = '\u{ee03}';
/// Start of the topic condition
pub const TOPIC_START_TAG: char = '\u{ee04}';
/// Start of the writing style condition
pub const STYLE_START_TAG: char = '\u{ee05}';
/// Start of the preference condition
pub const PREFERENCE_START_TAG: char = '\u{ee06}';

/// Free-text conditions steering conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conditions {
    pub profile: String,
    pub topic: String,
    pub style: String,
    pub preference: String,
}

impl Conditions {
    /// Whether every condition field is empty
    pub fn is_empty(&self) -> bool {
        self.profile.is_empty()
            && self.topic.is_empty()
            && self.style.is_empty()
            && self.preference.is_empty()
    }

    /// Append each non-empty condition with its tag, in fixed order.
    fn write_into(&self, out: &mut String) {
        let fields = [
            (PROFILE_START_TAG, &self.profile),
            (TOPIC_START_TAG, &self.topic),
            (STYLE_START_TAG, &self.style),
            (PREFERENCE_START_TAG, &self.preference),
        ];
        for (tag, value) in fields {
            if !value.is_empty() {
                out.push(tag);
                out.push_str(value);
            }
        }
    }
}

/// Build a prompt from left context and input only.
pub fn build_context_prompt(left_context: &str, input: &str) -> String {
    build_prompt(&Conditions::default(), left_context, input)
}

/// Build a prompt from conditions, left context and input.
pub fn build_prompt(conditions: &Conditions, left_context: &str, input: &str) -> String {
    let mut prompt = String::with_capacity(
        left_context.len() + input.len() + conditions_len(conditions) + 7 * 3,
    );

    conditions.write_into(&mut prompt);

    if !left_context.is_empty() {
        prompt.push(CONTEXT_START_TAG);
        prompt.push_str(left_context);
    }

    prompt.push(INPUT_START_TAG);
    prompt.push_str(input);
    prompt.push(OUTPUT_START_TAG);
    prompt
}

fn conditions_len(conditions: &Conditions) -> usize {
    conditions.profile.len()
        + conditions.topic.len()
        + conditions.style.len()
        + conditions.preference.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_prompt() {
        assert_eq!(
            build_context_prompt("今日は", "イイテンキ"),
            "\u{ee02}今日は\u{ee00}イイテンキ\u{ee01}"
        );
    }

    #[test]
    fn test_empty_context_is_omitted() {
        assert_eq!(
            build_context_prompt("", "カンジ"),
            "\u{ee00}カンジ\u{ee01}"
        );
    }

    #[test]
    fn test_condition_order_without_context() {
        let conditions = Conditions {
            profile: "A".to_string(),
            topic: "B".to_string(),
            ..Default::default()
        };
        assert_eq!(
            build_prompt(&conditions, "", "C"),
            "\u{ee03}A\u{ee04}B\u{ee00}C\u{ee01}"
        );
    }

    #[test]
    fn test_all_fields() {
        let conditions = Conditions {
            profile: "学生".to_string(),
            topic: "料理".to_string(),
            style: "丁寧".to_string(),
            preference: "漢字多め".to_string(),
        };
        assert_eq!(
            build_prompt(&conditions, "昨日は", "ニク"),
            "\u{ee03}学生\u{ee04}料理\u{ee05}丁寧\u{ee06}漢字多め\u{ee02}昨日は\u{ee00}ニク\u{ee01}"
        );
    }

    #[test]
    fn test_empty_conditions_have_no_tag() {
        let conditions = Conditions {
            style: "casual".to_string(),
            ..Default::default()
        };
        let prompt = build_prompt(&conditions, "", "x");
        assert!(!prompt.contains(PROFILE_START_TAG));
        assert!(!prompt.contains(TOPIC_START_TAG));
        assert!(!prompt.contains(PREFERENCE_START_TAG));
        assert_eq!(prompt, "\u{ee05}casual\u{ee00}x\u{ee01}");
    }

    #[test]
    fn test_conditions_default_matches_context_prompt() {
        assert!(Conditions::default().is_empty());
        assert_eq!(
            build_prompt(&Conditions::default(), "左", "ミギ"),
            build_context_prompt("左", "ミギ")
        );
    }

    #[test]
    fn test_output_tag_is_last() {
        let prompt = build_context_prompt("ctx", "in");
        assert!(prompt.ends_with(OUTPUT_START_TAG));
    }
}
