use serenity::model::guild;

use super::platform::Member;

/// Discord rejects autocomplete responses with more choices than this
pub const MAX_CHOICES: usize = 25;

/// A single completion list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The friendly name of this entry
    pub name: String,
    /// The value to be completed by this entry
    pub value: String,
}

/// A roster entry that can be offered as a completion
pub trait Candidate {
    fn is_bot(&self) -> bool;

    fn display_name(&self) -> &str;

    /// Build the completion entry for this candidate
    fn completion(&self) -> Completion;
}

impl Candidate for Member {
    fn is_bot(&self) -> bool { self.bot }

    fn display_name(&self) -> &str { &self.display_name }

    fn completion(&self) -> Completion {
        Completion {
            name: format!("{} ({})", self.display_name, self.username),
            value: self.id.to_string(),
        }
    }
}

impl Candidate for guild::Member {
    fn is_bot(&self) -> bool { self.user.bot }

    fn display_name(&self) -> &str { guild::Member::display_name(self) }

    fn completion(&self) -> Completion {
        Completion {
            name: format!("{} ({})", guild::Member::display_name(self), self.user.name),
            value: self.user.id.to_string(),
        }
    }
}

/// Suggest non-bot members whose display name starts with `prefix`, ignoring
/// case, in roster order
///
/// Only the returned entries are materialized.
pub fn suggest<'a, C: Candidate + 'a>(
    prefix: &str,
    roster: impl IntoIterator<Item = &'a C>,
) -> Vec<Completion> {
    let prefix = prefix.to_lowercase();

    roster
        .into_iter()
        .filter(|m| !m.is_bot() && m.display_name().to_lowercase().starts_with(&prefix))
        .take(MAX_CHOICES)
        .map(Candidate::completion)
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serenity::model::id::UserId;

    use super::{suggest, Candidate, Completion, MAX_CHOICES};
    use crate::client::platform::Member;

    fn member(id: u64, display_name: &str, bot: bool) -> Member {
        Member {
            id: UserId::new(id),
            display_name: display_name.into(),
            username: display_name.to_lowercase().replace(' ', "_"),
            bot,
            avatar_url: format!("https://cdn.discordapp.com/embed/avatars/{}.png", id % 5),
        }
    }

    fn ids(completions: &[Completion]) -> Vec<&str> {
        completions.iter().map(|c| c.value.as_str()).collect()
    }

    #[test]
    fn test_prefix_ignores_case() {
        let roster = [
            member(1, "Alice", false),
            member(2, "bob", false),
            member(3, "ALFRED", false),
            member(4, "Malice", false),
        ];

        assert_eq!(ids(&suggest("al", &roster)), ["1", "3"]);
        assert_eq!(ids(&suggest("AL", &roster)), ["1", "3"]);
        assert_eq!(ids(&suggest("B", &roster)), ["2"]);
    }

    #[test]
    fn test_excludes_bots() {
        let roster = [
            member(1, "Alice", false),
            member(2, "AliceBot", true),
            member(3, "Alicia", false),
        ];

        assert_eq!(ids(&suggest("ali", &roster)), ["1", "3"]);
    }

    #[test]
    fn test_label_and_value() {
        let roster = [member(42, "Alice", false)];

        assert_eq!(suggest("", &roster), [Completion {
            name: "Alice (alice)".into(),
            value: "42".into(),
        }]);
    }

    #[test]
    fn test_truncates_in_roster_order() {
        let roster: Vec<_> = (1..=40)
            .map(|i| member(i, &format!("user {i}"), i % 7 == 0))
            .collect();

        let expected: Vec<_> = roster
            .iter()
            .filter(|m| !m.bot)
            .take(MAX_CHOICES)
            .map(|m| m.id.to_string())
            .collect();

        let got = suggest("", &roster);
        assert_eq!(got.len(), MAX_CHOICES);
        assert_eq!(ids(&got), expected);
    }

    #[test]
    fn test_empty_roster() {
        let roster: [Member; 0] = [];

        assert!(suggest("", &roster).is_empty());
        assert!(suggest("anything", &roster).is_empty());
    }

    fn roster_strategy() -> impl Strategy<Value = Vec<Member>> {
        prop::collection::vec(("[a-cA-C ]{0,6}", any::<bool>()), 0..60).prop_map(|v| {
            v.into_iter()
                .enumerate()
                .map(|(i, (name, bot))| member(i as u64 + 1, &name, bot))
                .collect()
        })
    }

    proptest::proptest! {
        #[test]
        fn test_suggest_properties(prefix in "[a-cA-C]{0,2}", roster in roster_strategy()) {
            let got = suggest(&prefix, &roster);
            let lower = prefix.to_lowercase();

            prop_assert!(got.len() <= MAX_CHOICES);

            let expected: Vec<_> = roster
                .iter()
                .filter(|m| !m.bot && m.display_name.to_lowercase().starts_with(&lower))
                .take(MAX_CHOICES)
                .map(Candidate::completion)
                .collect();
            prop_assert_eq!(&got, &expected);

            for c in &got {
                let m = roster.iter().find(|m| m.id.to_string() == c.value).unwrap();
                prop_assert!(!m.bot);
                prop_assert!(m.display_name.to_lowercase().starts_with(&lower));
            }
        }

        #[test]
        fn test_empty_prefix_keeps_all_humans(roster in roster_strategy()) {
            let humans = roster.iter().filter(|m| !m.bot).count();

            prop_assert_eq!(suggest("", &roster).len(), humans.min(MAX_CHOICES));
        }
    }
}
