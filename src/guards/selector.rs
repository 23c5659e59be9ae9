//! Picks the rules that govern a mint attempt

use crate::candy::{CandyGuard, GuardSet};
use crate::types::{EligibilityGuard, DEFAULT_LABEL};

/// The group and rule set chosen for a mint attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGuard {
    /// Display label, `"default"` when the default rules apply
    pub label: String,
    /// Group passed to `mint_v2`, `None` for the default rules
    pub group: Option<String>,
    /// `None` when no candy guard is loaded
    pub guards: Option<GuardSet>,
}

impl ResolvedGuard {
    pub fn has_rules(&self) -> bool {
        self.guards.is_some()
    }
}

/// Resolve the rules for `guard`: its group layered over the defaults when the
/// group exists, the defaults under `"default"` otherwise
pub fn choose_guard_to_use(
    guard: &EligibilityGuard,
    candy_guard: Option<&CandyGuard>,
) -> ResolvedGuard {
    let Some(candy_guard) = candy_guard else {
        return ResolvedGuard {
            label: guard.label.clone(),
            group: None,
            guards: None,
        };
    };

    match candy_guard.group(&guard.label) {
        Some(group) => ResolvedGuard {
            label: group.label.clone(),
            group: Some(group.label.clone()),
            guards: Some(group.guards.merged_over(&candy_guard.guards)),
        },
        None => ResolvedGuard {
            label: DEFAULT_LABEL.to_string(),
            group: None,
            guards: Some(candy_guard.guards.clone()),
        },
    }
}
