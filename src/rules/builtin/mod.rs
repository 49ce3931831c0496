mod logic;
mod mapping;
mod naming;
mod resource;

use crate::rules::types::PatternRule;
use std::sync::LazyLock;

/// Bumped whenever a rule is added, removed or changes meaning.
pub const CATALOG_VERSION: &str = "2024.2";

static ALL_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    let mut rules = Vec::with_capacity(15);
    rules.extend(mapping::rules());
    rules.extend(naming::rules());
    rules.extend(resource::rules());
    rules.extend(logic::rules());
    rules
});

pub fn all_rules() -> &'static [PatternRule] {
    &ALL_RULES
}
