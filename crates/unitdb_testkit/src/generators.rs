//! Property-based test generators using proptest.

use proptest::prelude::*;

/// A person as it is written to a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRow {
    /// Value of `Person::NAME`.
    pub name: String,
    /// Value of `Person::NICKNAME`, if set.
    pub nickname: Option<String>,
    /// Value of `Person::AGE`.
    pub age: i64,
}

/// Strategy for person names; drawn from a small pool so filters hit.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Ulli", "Philipp", "Ana", "Bo", "Chen"]).prop_map(String::from)
}

/// Strategy for valid ages.
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0i64..120
}

/// Strategy for a single person.
pub fn person_strategy() -> impl Strategy<Value = PersonRow> {
    (
        name_strategy(),
        prop::option::of(name_strategy()),
        age_strategy(),
    )
        .prop_map(|(name, nickname, age)| PersonRow {
            name,
            nickname,
            age,
        })
}

/// Strategy for up to `max` people.
pub fn people_strategy(max: usize) -> impl Strategy<Value = Vec<PersonRow>> {
    prop::collection::vec(person_strategy(), 0..=max)
}

/// What a unit of work does to one previously committed person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Leave it alone.
    Keep,
    /// Change its age.
    SetAge(i64),
    /// Remove it.
    Remove,
}

/// Strategy for edits to existing entities.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        Just(Edit::Keep),
        age_strategy().prop_map(Edit::SetAge),
        Just(Edit::Remove),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_people_are_valid(people in people_strategy(10)) {
            prop_assert!(people.len() <= 10);
            for person in people {
                prop_assert!(!person.name.is_empty());
                prop_assert!((0..120).contains(&person.age));
            }
        }
    }
}
