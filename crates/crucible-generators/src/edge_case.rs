use crate::{case_id, Generator};
use crucible_core::model::TestCase;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::json;

const NUMERIC: &[&str] = &[
    "0",
    "1",
    "-1",
    "1000000000",
    "-1000000000",
    "0.000000001",
    "999999999999.99999",
];

const DEGENERATE: &[&str] = &["", " ", "\n", "\t"];

const BROKEN_MARKUP: &[&str] = &[
    "<p>Broken HTML<span>",
    "<root><item>value</item><root>",
    "col1,col2,col3\nval1,val2\nvalA,valB,valC,valD",
];

const UNICODE: &[&str] = &["\u{0000}", "\u{202E}", "\u{FEFF}"];

const SUBCATEGORIES: &[&str] = &["numeric", "degenerate", "broken_markup", "unicode"];

/// Numeric extremes, degenerate strings, broken markup and hostile unicode.
pub struct EdgeCaseGenerator;

impl Generator for EdgeCaseGenerator {
    fn name(&self) -> &'static str {
        "edge_case"
    }

    fn generate(&self, count: usize, rng: &mut StdRng) -> Vec<TestCase> {
        (0..count)
            .map(|i| {
                let sub = *SUBCATEGORIES.choose(rng).unwrap();
                let raw = match sub {
                    "numeric" => NUMERIC.choose(rng).unwrap(),
                    "degenerate" => DEGENERATE.choose(rng).unwrap(),
                    "broken_markup" => BROKEN_MARKUP.choose(rng).unwrap(),
                    _ => UNICODE.choose(rng).unwrap(),
                };
                TestCase {
                    id: case_id(self.name(), sub, i),
                    category: self.name().to_string(),
                    subcategory: Some(sub.to_string()),
                    payload: format!("Interpret this input exactly as given: {:?}", raw),
                    expected_behavior: None,
                    metadata: Some(json!({ "generator": self.name() })),
                }
            })
            .collect()
    }
}
