//! Guard list shaping for display

use itertools::Itertools;
use std::collections::HashMap;

use crate::candy::CandyGuard;
use crate::types::{EligibilityGuard, GuardButton, MintText, DEFAULT_LABEL};

/// One entry per label, first occurrence wins
pub fn dedupe_guards(list: &[EligibilityGuard]) -> Vec<EligibilityGuard> {
    list.iter()
        .unique_by(|guard| guard.label.as_str())
        .cloned()
        .collect()
}

/// Guards to render; the default entry is hidden next to real groups
pub fn display_guards(list: &[EligibilityGuard]) -> Vec<EligibilityGuard> {
    let unique = dedupe_guards(list);
    if unique.len() > 1 {
        unique
            .into_iter()
            .filter(|guard| guard.label != DEFAULT_LABEL)
            .collect()
    } else {
        unique
    }
}

/// Clamp a requested quantity to `[1, max_amount]`
pub fn clamp_mint_amount(requested: u64, max_amount: u64) -> u64 {
    requested.clamp(1, max_amount.max(1))
}

fn missing(field: &str) -> String {
    format!("{field} missing in settings")
}

/// Join display guards with their sale windows and configured texts
pub fn build_button_list(
    guards: &[EligibilityGuard],
    candy_guard: Option<&CandyGuard>,
    mint_texts: &HashMap<String, MintText>,
) -> Vec<GuardButton> {
    display_guards(guards)
        .into_iter()
        .map(|guard| {
            let rules = candy_guard.and_then(|cg| match cg.group(&guard.label) {
                Some(group) => Some(&group.guards),
                None if guard.label == DEFAULT_LABEL => Some(&cg.guards),
                None => None,
            });
            let start_time = rules.and_then(|r| r.start_date).unwrap_or(0);
            let end_time = rules.and_then(|r| r.end_date).unwrap_or(0);
            let text = mint_texts.get(&guard.label);

            GuardButton {
                header: text
                    .and_then(|t| t.header.clone())
                    .unwrap_or_else(|| missing("header")),
                mint_text: text
                    .and_then(|t| t.mint_text.clone())
                    .unwrap_or_else(|| missing("mintText")),
                button_label: text
                    .and_then(|t| t.button_label.clone())
                    .unwrap_or_else(|| missing("buttonLabel")),
                start_time,
                end_time,
                allowed: guard.allowed,
                reason: guard.reason,
                max_amount: guard.max_amount,
                minting: guard.minting,
                loading_text: guard.loading_text,
                label: guard.label,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candy::{GuardSet, SaleGroup};
    use proptest::prelude::*;
    use solana_sdk::pubkey::Pubkey;

    fn labels(list: &[EligibilityGuard]) -> Vec<&str> {
        list.iter().map(|g| g.label.as_str()).collect()
    }

    fn guards(labels: &[&str]) -> Vec<EligibilityGuard> {
        labels
            .iter()
            .map(|l| EligibilityGuard::allowed(*l, 1))
            .collect()
    }

    #[test]
    fn test_display_hides_default_next_to_groups() {
        let list = guards(&["default", "default", "early", "early"]);
        assert_eq!(labels(&display_guards(&list)), vec!["early"]);
    }

    #[test]
    fn test_display_keeps_lone_default() {
        let list = guards(&["default", "default"]);
        assert_eq!(labels(&display_guards(&list)), vec!["default"]);
        assert!(display_guards(&[]).is_empty());
    }

    #[test]
    fn test_dedupe_keeps_first_seen_entry() {
        let mut list = guards(&["early", "public"]);
        list.push(EligibilityGuard::denied("early", "Sold out"));
        let unique = dedupe_guards(&list);
        assert_eq!(labels(&unique), vec!["early", "public"]);
        assert!(unique[0].allowed);
    }

    #[test]
    fn test_clamp_examples() {
        assert_eq!(clamp_mint_amount(0, 5), 1);
        assert_eq!(clamp_mint_amount(9, 5), 5);
        assert_eq!(clamp_mint_amount(3, 5), 3);
        assert_eq!(clamp_mint_amount(4, 0), 1);
    }

    #[test]
    fn test_button_list_windows_and_fallback_texts() {
        let cg = CandyGuard {
            address: Pubkey::new_unique(),
            base: Pubkey::new_unique(),
            bump: 0,
            authority: Pubkey::new_unique(),
            guards: GuardSet::default(),
            groups: vec![
                SaleGroup {
                    label: "early".to_string(),
                    guards: GuardSet {
                        start_date: Some(100),
                        end_date: Some(200),
                        ..Default::default()
                    },
                },
                SaleGroup {
                    label: "public".to_string(),
                    guards: GuardSet::default(),
                },
            ],
        };
        let mut texts = HashMap::new();
        texts.insert(
            "early".to_string(),
            MintText {
                header: Some("Early birds".to_string()),
                mint_text: Some("0.1 SOL".to_string()),
                button_label: Some("Mint early".to_string()),
            },
        );

        let buttons = build_button_list(&guards(&["default", "early", "public"]), Some(&cg), &texts);
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0].header, "Early birds");
        assert_eq!((buttons[0].start_time, buttons[0].end_time), (100, 200));
        assert_eq!(buttons[1].header, "header missing in settings");
        assert_eq!(buttons[1].button_label, "buttonLabel missing in settings");
        assert_eq!((buttons[1].start_time, buttons[1].end_time), (0, 0));
    }

    proptest! {
        #[test]
        fn prop_clamp_stays_in_bounds(requested in any::<u64>(), max in any::<u64>()) {
            let amount = clamp_mint_amount(requested, max);
            prop_assert!(amount >= 1);
            prop_assert!(amount <= max.max(1));
            if requested >= 1 && requested <= max {
                prop_assert_eq!(amount, requested);
            }
        }

        #[test]
        fn prop_dedupe_unique_and_ordered(raw in proptest::collection::vec("[a-d]", 0..20)) {
            let list: Vec<EligibilityGuard> =
                raw.iter().map(|l| EligibilityGuard::allowed(l.clone(), 1)).collect();
            let unique = dedupe_guards(&list);

            let mut expected: Vec<&str> = Vec::new();
            for label in &raw {
                if !expected.contains(&label.as_str()) {
                    expected.push(label);
                }
            }
            prop_assert_eq!(labels(&unique), expected);
        }
    }
}
