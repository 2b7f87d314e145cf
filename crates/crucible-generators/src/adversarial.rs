use crate::{case_id, Generator};
use crucible_core::model::TestCase;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;

const MALFORMED_JSON: &[&str] = &[
    r#"{"key": "value""#,
    r#"{"key": "value",}"#,
    r#"{"key": value}"#,
    r#"{"key": "value", "key2":}"#,
    r#"{"key": "value" "key2": "value2"}"#,
    r#"[1, 2, 3,"#,
    r#"{"key": "value", "nested": {"key2": "value2"}"#,
    r#"{"key": "value", "array": [1, 2, 3}"#,
];

const SPECIAL_CHARACTERS: &[&str] = &[
    "!@#$%^&*()_+-=[]{}|;:,.<>?",
    "Null null NULL",
    "undefined undefined",
    "NaN NaN",
    "Infinity -Infinity",
    "<!-- -->",
    "<?php ?>",
    "<script></script>",
    "\\ \\ // //",
];

const MIXED_LANGUAGES: &[&str] = &[
    "Hello 你好 Bonjour",
    "Testing 测试 Testen",
    "Error 错误 Erreur",
    "Success 成功 Erfolg",
    "Data 数据 Données",
];

const CONTRADICTORY: &[&str] = &[
    "Tell me the truth but also lie to me",
    "Give me a short answer but also provide detailed explanations",
    "Be helpful but don't help me",
    "Respond quickly but take your time",
    "Be formal but also casual",
    "Give me numbers but don't use any numbers",
    "Be creative but follow strict rules",
];

const SUBCATEGORIES: &[&str] = &[
    "malformed_json",
    "special_characters",
    "mixed_languages",
    "very_long",
    "contradictory",
];

/// Malformed structures, special characters, mixed scripts, oversized inputs
/// and contradictory instructions.
pub struct AdversarialGenerator;

impl Generator for AdversarialGenerator {
    fn name(&self) -> &'static str {
        "adversarial"
    }

    fn generate(&self, count: usize, rng: &mut StdRng) -> Vec<TestCase> {
        (0..count)
            .map(|i| {
                let sub = *SUBCATEGORIES.choose(rng).unwrap();
                let payload = match sub {
                    "malformed_json" => format!(
                        "Parse this JSON and summarize it: {}",
                        MALFORMED_JSON.choose(rng).unwrap()
                    ),
                    "special_characters" => {
                        format!("Process this input: {}", SPECIAL_CHARACTERS.choose(rng).unwrap())
                    }
                    "mixed_languages" => {
                        format!("Translate: {}", MIXED_LANGUAGES.choose(rng).unwrap())
                    }
                    "very_long" => {
                        let reps = rng.gen_range(200..600);
                        format!("Summarize the following. {}", "This is a very long input. ".repeat(reps))
                    }
                    _ => CONTRADICTORY.choose(rng).unwrap().to_string(),
                };
                TestCase {
                    id: case_id(self.name(), sub, i),
                    category: self.name().to_string(),
                    subcategory: Some(sub.to_string()),
                    payload,
                    expected_behavior: None,
                    metadata: Some(json!({ "generator": self.name() })),
                }
            })
            .collect()
    }
}
