use crucible_core::model::TestCase;
use rand::rngs::StdRng;
use rand::SeedableRng;

mod adversarial;
mod edge_case;
mod injection;

pub use adversarial::AdversarialGenerator;
pub use edge_case::EdgeCaseGenerator;
pub use injection::PromptInjectionGenerator;

/// Produces batches of test cases for one attack family. Generators are
/// deterministic for a given RNG state, so a seed reproduces a batch exactly.
pub trait Generator {
    fn name(&self) -> &'static str;
    fn generate(&self, count: usize, rng: &mut StdRng) -> Vec<TestCase>;
}

pub fn by_name(name: &str) -> Option<Box<dyn Generator>> {
    match name {
        "adversarial" => Some(Box::new(AdversarialGenerator)),
        "prompt_injection" => Some(Box::new(PromptInjectionGenerator)),
        "edge_case" => Some(Box::new(EdgeCaseGenerator)),
        _ => None,
    }
}

pub fn generate_seeded(gen: &dyn Generator, count: usize, seed: u64) -> Vec<TestCase> {
    let mut rng = StdRng::seed_from_u64(seed);
    gen.generate(count, &mut rng)
}

pub(crate) fn case_id(family: &str, subcategory: &str, index: usize) -> String {
    format!("{}-{}-{:04}", family, subcategory, index)
}
