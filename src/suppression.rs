//! Inline directives that silence pattern rules.
//!
//! - `# halluscan-ignore[:ID,ID]` silences rules on its own line
//! - `# halluscan-ignore-next-line[:ID]` silences rules on the following line
//! - `# halluscan-disable[:ID]` silences rules until `# halluscan-enable`
//!
//! Without an id list every rule is silenced.

use crate::analysis::source::strip_comment;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"halluscan-(ignore-next-line|ignore|disable|enable)(?::([A-Z0-9,-]+))?(?:\s|$)")
        .expect("DIRECTIVE: invalid regex")
});

/// Rules a directive silences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Silenced {
    Everything,
    Rules(BTreeSet<String>),
}

impl Silenced {
    pub fn covers(&self, rule_id: &str) -> bool {
        match self {
            Silenced::Everything => true,
            Silenced::Rules(ids) => ids.contains(rule_id),
        }
    }

    /// Everything either side silences.
    pub fn union(self, other: Silenced) -> Silenced {
        match (self, other) {
            (Silenced::Rules(mut ids), Silenced::Rules(more)) => {
                ids.extend(more);
                Silenced::Rules(ids)
            }
            _ => Silenced::Everything,
        }
    }

    fn parse(ids: Option<&str>) -> Self {
        let ids: BTreeSet<String> = ids
            .into_iter()
            .flat_map(|list| list.split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            Silenced::Everything
        } else {
            Silenced::Rules(ids)
        }
    }
}

fn merge(current: Option<Silenced>, more: Silenced) -> Silenced {
    match current {
        Some(current) => current.union(more),
        None => more,
    }
}

enum Directive {
    Ignore(Silenced),
    IgnoreNextLine(Silenced),
    Disable(Silenced),
    Enable,
}

fn directives(comment: &str) -> impl Iterator<Item = Directive> + '_ {
    DIRECTIVE.captures_iter(comment).map(|caps| {
        let silenced = || Silenced::parse(caps.get(2).map(|m| m.as_str()));
        match &caps[1] {
            "ignore-next-line" => Directive::IgnoreNextLine(silenced()),
            "disable" => Directive::Disable(silenced()),
            "enable" => Directive::Enable,
            _ => Directive::Ignore(silenced()),
        }
    })
}

/// What is silenced on each of `lines`: the union of a pending next-line
/// directive, directives on the line itself and an open disabled region.
/// Directives count only inside `#` comments.
pub fn suppressions(lines: &[&str]) -> Vec<Option<Silenced>> {
    let mut region: Option<Silenced> = None;
    let mut carried: Option<Silenced> = None;

    lines
        .iter()
        .map(|line| {
            let comment = &line[strip_comment(line).len()..];
            let mut own = carried.take();
            for directive in directives(comment) {
                match directive {
                    Directive::Enable => region = None,
                    Directive::Disable(silenced) => region = Some(silenced),
                    Directive::IgnoreNextLine(silenced) => carried = Some(silenced),
                    Directive::Ignore(silenced) => own = Some(merge(own, silenced)),
                }
            }
            match (own, region.clone()) {
                (Some(own), Some(region)) => Some(own.union(region)),
                (own, region) => own.or(region),
            }
        })
        .collect()
}
