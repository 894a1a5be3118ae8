//! Hidesets.
//!
//! Every token carries a set of macro names that are no longer allowed to
//! expand it. A macro body spliced into the stream receives the union of the
//! invocation token's hideset and the macro's own name, which is what makes
//! rescanning of self-referential macros terminate.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::token::Token;

/// An immutable set of macro names.
///
/// Hidesets have value semantics: operations never mutate their operands and
/// always return a fresh set. Cloning is cheap (the underlying set is
/// reference counted), so tokens can carry their hideset by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hideset(Option<Rc<BTreeSet<String>>>);

impl Hideset {
    /// The empty set.
    pub fn new() -> Self {
        Hideset(None)
    }

    /// A set containing a single macro name.
    pub fn solo(name: &str) -> Self {
        let mut set = BTreeSet::new();
        set.insert(name.to_owned());
        Hideset(Some(Rc::new(set)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_ref().map_or(true, |s| s.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.as_ref().map_or(false, |s| s.contains(name))
    }

    /// The union of `self` and `other`.
    pub fn union(&self, other: &Hideset) -> Hideset {
        match (&self.0, &other.0) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(a), Some(b)) => {
                let mut set = (**a).clone();
                set.extend(b.iter().cloned());
                Hideset(Some(Rc::new(set)))
            }
        }
    }

    /// The intersection of `self` and `other`.
    ///
    /// Used at function-like invocations to combine the hideset of the macro
    /// name with the hideset of the closing parenthesis.
    pub fn intersection(&self, other: &Hideset) -> Hideset {
        match (&self.0, &other.0) {
            (None, _) | (_, None) => Hideset::new(),
            (Some(a), Some(b)) => {
                let set: BTreeSet<String> = a.intersection(b).cloned().collect();
                if set.is_empty() {
                    Hideset::new()
                } else {
                    Hideset(Some(Rc::new(set)))
                }
            }
        }
    }
}

/// Replaces the hideset of every token in `tokens` by its union with `hs`.
///
/// The tokens are owned copies of a macro body, so growing their hidesets in
/// place preserves the value semantics of the sets themselves.
pub(crate) fn add_hideset(tokens: &mut [Token], hs: &Hideset) {
    for tok in tokens.iter_mut() {
        tok.hideset = tok.hideset.union(hs);
    }
}

#[cfg(test)]
mod tests {
    use super::Hideset;

    #[test]
    fn union_works() {
        let a = Hideset::solo("a");
        let b = Hideset::solo("b");
        let ab = a.union(&b);
        assert!(ab.contains("a") && ab.contains("b"));
        // operands are untouched
        assert!(!a.contains("b"));
        assert!(!b.contains("a"));
    }

    #[test]
    fn union_with_empty() {
        let a = Hideset::solo("a");
        assert_eq!(a.union(&Hideset::new()), a);
        assert_eq!(Hideset::new().union(&a), a);
    }

    #[test]
    fn intersection_works() {
        let ab = Hideset::solo("a").union(&Hideset::solo("b"));
        let bc = Hideset::solo("b").union(&Hideset::solo("c"));
        let b = ab.intersection(&bc);
        assert!(b.contains("b"));
        assert!(!b.contains("a") && !b.contains("c"));
        assert!(ab.intersection(&Hideset::new()).is_empty());
    }
}
