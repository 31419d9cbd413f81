use std::fmt::{Display, Formatter};

use gpui::SharedString;

/// Dot/bracket path of a field inside the form values, e.g. `address.city`
/// or `tags[2].label`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldName(SharedString);

impl FieldName {
    pub fn new(value: impl Into<SharedString>) -> Self {
        Self(value.into())
    }

    pub fn root() -> Self {
        Self(SharedString::from(""))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.as_str().is_empty()
    }

    /// `address` joined with `city` gives `address.city`.
    pub fn join(&self, child: &FieldName) -> FieldName {
        if self.is_root() {
            return child.clone();
        }
        if child.is_root() {
            return self.clone();
        }
        FieldName::new(format!("{}.{}", self.as_str(), child.as_str()))
    }

    pub fn index(&self, index: usize) -> FieldName {
        FieldName::new(format!("{}[{index}]", self.as_str()))
    }

    /// Splits `tags[2].label` under list `tags` into `(2, ".label")`.
    pub fn index_under<'a>(&'a self, list: &FieldName) -> Option<(usize, &'a str)> {
        let rest = self.as_str().strip_prefix(list.as_str())?;
        let rest = rest.strip_prefix('[')?;
        let close = rest.find(']')?;
        let index = rest[..close].parse::<usize>().ok()?;
        let tail = &rest[close + 1..];
        if tail.is_empty() || tail.starts_with('.') || tail.starts_with('[') {
            Some((index, tail))
        } else {
            None
        }
    }

    /// True for the name itself and every path nested under it.
    pub fn contains(&self, other: &FieldName) -> bool {
        if self.is_root() {
            return true;
        }
        match other.as_str().strip_prefix(self.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
            None => false,
        }
    }
}

impl Default for FieldName {
    fn default() -> Self {
        Self::root()
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for FieldName {
    fn from(value: &'static str) -> Self {
        Self(value.into())
    }
}

impl From<String> for FieldName {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl PartialEq<str> for FieldName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for FieldName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Typed path into a form model.
///
/// `#[derive(FormModel)]` generates one lens per struct field; [`Compose`]
/// chains them into nested paths.
pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: Clone + PartialEq + Send + Sync + 'static;

    fn name(self) -> FieldName;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn get_mut<'a>(self, model: &'a mut T) -> &'a mut Self::Value;

    fn set(self, model: &mut T, value: Self::Value) {
        *self.get_mut(model) = value;
    }

    /// Whether the path resolves in `model`. Lenses into dynamic containers
    /// override this so a missing path fails form construction.
    fn is_present(self, _model: &T) -> bool {
        true
    }
}

/// The whole model.
#[derive(Clone, Copy, Debug, Default)]
pub struct RootLens;

impl<T> FieldLens<T> for RootLens
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn name(self) -> FieldName {
        FieldName::root()
    }

    fn get<'a>(self, model: &'a T) -> &'a T {
        model
    }

    fn get_mut<'a>(self, model: &'a mut T) -> &'a mut T {
        model
    }
}

/// `parent` followed by `child`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Compose<P, C> {
    parent: P,
    child: C,
}

impl<P, C> Compose<P, C> {
    pub const fn new(parent: P, child: C) -> Self {
        Self { parent, child }
    }
}

impl<T, P, C> FieldLens<T> for Compose<P, C>
where
    P: FieldLens<T>,
    C: FieldLens<P::Value>,
{
    type Value = C::Value;

    fn name(self) -> FieldName {
        self.parent.name().join(&self.child.name())
    }

    fn get<'a>(self, model: &'a T) -> &'a C::Value {
        self.child.get(self.parent.get(model))
    }

    fn get_mut<'a>(self, model: &'a mut T) -> &'a mut C::Value {
        self.child.get_mut(self.parent.get_mut(model))
    }

    fn is_present(self, model: &T) -> bool {
        self.parent.is_present(model) && self.child.is_present(self.parent.get(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_skips_root_segments() {
        let root = FieldName::root();
        let address = FieldName::from("address");
        assert_eq!(root.join(&address), "address");
        assert_eq!(address.join(&"city".into()), "address.city");
    }

    #[test]
    fn index_under_parses_bracket_segments() {
        let list = FieldName::from("tags");
        assert_eq!(FieldName::from("tags[2]").index_under(&list), Some((2, "")));
        assert_eq!(
            FieldName::from("tags[10].label").index_under(&list),
            Some((10, ".label"))
        );
        assert_eq!(FieldName::from("tags").index_under(&list), None);
        assert_eq!(FieldName::from("tagsx[1]").index_under(&list), None);
        assert_eq!(FieldName::from("tags[a]").index_under(&list), None);
    }

    #[test]
    fn contains_respects_segment_boundaries() {
        let address = FieldName::from("address");
        assert!(address.contains(&"address".into()));
        assert!(address.contains(&"address.city".into()));
        assert!(!address.contains(&"addresses".into()));
    }
}
