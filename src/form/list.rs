use std::collections::BTreeMap;
use std::ops::Deref;

use super::controller::{FieldUpdate, FormError, FormResult, NameSet};
use super::field::Field;
use super::path::{FieldLens, FieldName};
use crate::reactive::{StoreValue, batch};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum IndexShift {
    Removed(usize),
    Inserted(usize),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Rekey {
    Keep,
    Drop,
    Move(usize),
}

impl IndexShift {
    fn rekey(self, index: usize) -> Rekey {
        match self {
            IndexShift::Removed(at) if index == at => Rekey::Drop,
            IndexShift::Removed(at) if index > at => Rekey::Move(index - 1),
            IndexShift::Inserted(at) if index >= at => Rekey::Move(index + 1),
            _ => Rekey::Keep,
        }
    }
}

/// New name of `name` after `shift` was applied to `list`; `None` when the
/// entry it belonged to was removed.
fn rekey_name(list: &FieldName, name: &FieldName, shift: IndexShift) -> Option<FieldName> {
    let Some((index, tail)) = name.index_under(list) else {
        return Some(name.clone());
    };
    match shift.rekey(index) {
        Rekey::Keep => Some(name.clone()),
        Rekey::Drop => None,
        Rekey::Move(next) => Some(FieldName::new(format!("{}{tail}", list.index(next)))),
    }
}

fn rekey_set(set: &NameSet, list: &FieldName, shift: IndexShift) -> NameSet {
    set.iter()
        .filter_map(|name| rekey_name(list, name, shift))
        .collect()
}

fn rekey_map<V: Clone>(
    map: &BTreeMap<FieldName, V>,
    list: &FieldName,
    shift: IndexShift,
) -> BTreeMap<FieldName, V> {
    map.iter()
        .filter_map(|(name, value)| Some((rekey_name(list, name, shift)?, value.clone())))
        .collect()
}

/// A `Vec`-valued field with ordered mutations.
///
/// Every mutation is one batch: the list is written, the list field becomes
/// dirty, and per-name state recorded under `list[i]` follows its entry.
/// Entries are addressed by index through the `*_at` commands.
pub struct ListField<R: StoreValue, L: FieldLens<R>> {
    field: Field<R, L>,
}

impl<R: StoreValue, L: FieldLens<R>> Clone for ListField<R, L> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
        }
    }
}

impl<R: StoreValue, L: FieldLens<R>> Deref for ListField<R, L> {
    type Target = Field<R, L>;

    fn deref(&self) -> &Field<R, L> {
        &self.field
    }
}

impl<R, L, E> ListField<R, L>
where
    R: StoreValue,
    L: FieldLens<R, Value = Vec<E>>,
    E: StoreValue,
{
    pub(crate) fn new(field: Field<R, L>) -> Self {
        Self { field }
    }

    pub fn len(&self) -> usize {
        self.field.value().with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, item: E) {
        self.edit("push", |items| {
            items.push(item);
            Some(((), None))
        });
    }

    pub fn unshift(&self, item: E) {
        self.edit("unshift", |items| {
            items.insert(0, item);
            Some(((), Some(IndexShift::Inserted(0))))
        });
    }

    /// Inserts before `index`; indices past the end append.
    pub fn insert(&self, index: usize, item: E) {
        self.edit("insert", |items| {
            let index = index.min(items.len());
            items.insert(index, item);
            Some(((), Some(IndexShift::Inserted(index))))
        });
    }

    pub fn pop(&self) -> Option<E> {
        self.edit("pop", |items| {
            let item = items.pop()?;
            Some((item, Some(IndexShift::Removed(items.len()))))
        })
    }

    pub fn shift(&self) -> Option<E> {
        self.edit("shift", |items| {
            if items.is_empty() {
                return None;
            }
            Some((items.remove(0), Some(IndexShift::Removed(0))))
        })
    }

    pub fn remove(&self, index: usize) -> Option<E> {
        let removed = self.edit("remove", |items| {
            if index >= items.len() {
                return None;
            }
            Some((items.remove(index), Some(IndexShift::Removed(index))))
        });
        if removed.is_none() {
            tracing::warn!(
                form = %self.field.units().id,
                field = %self.field.name(),
                index,
                "list remove out of range"
            );
        }
        removed
    }

    /// Writes entry `index` without marking it dirty.
    pub fn set_at(&self, index: usize, item: E) -> FormResult<()> {
        let update = self.entry_update(index, item)?;
        self.field.units().events.set.emit(update);
        Ok(())
    }

    /// User edit of entry `index`; the entry and the list become dirty.
    pub fn change_at(&self, index: usize, item: E) -> FormResult<()> {
        let update = self.entry_update(index, item)?;
        self.field.units().events.change.emit(update);
        Ok(())
    }

    pub fn blur_at(&self, index: usize) -> FormResult<()> {
        let name = self.entry_name(index)?;
        self.field.units().events.blur.emit(name);
        Ok(())
    }

    pub fn focus_at(&self, index: usize) -> FormResult<()> {
        let name = self.entry_name(index)?;
        self.field.units().events.focus.emit(name);
        Ok(())
    }

    fn entry_name(&self, index: usize) -> FormResult<FieldName> {
        let name = self.field.name().index(index);
        if index < self.len() {
            Ok(name)
        } else {
            Err(FormError::UnknownField(name))
        }
    }

    fn entry_update(&self, index: usize, item: E) -> FormResult<FieldUpdate<R>> {
        let name = self.entry_name(index)?;
        let lens = self.field.lens();
        Ok(FieldUpdate::from_fn(name, move |values: &mut R| {
            if let Some(slot) = lens.get_mut(values).get_mut(index) {
                *slot = item.clone();
            }
        }))
    }

    fn edit<O>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut Vec<E>) -> Option<(O, Option<IndexShift>)>,
    ) -> Option<O> {
        let units = self.field.units();
        let stores = &units.stores;
        let lens = self.field.lens();
        let name = self.field.name();

        batch(|| {
            let mut items = stores.values.with(|values| lens.get(values).clone());
            let (output, shift) = apply(&mut items)?;
            stores.values.update(|values| lens.set(values, items));
            stores.dirty.update(|dirty| {
                if let Some(shift) = shift {
                    *dirty = rekey_set(dirty, name, shift);
                }
                dirty.insert(name.clone());
            });
            if let Some(shift) = shift {
                stores
                    .touched
                    .update(|touched| *touched = rekey_set(touched, name, shift));
                stores
                    .errors
                    .update(|errors| *errors = rekey_map(errors, name, shift));
                stores
                    .external_errors
                    .update(|errors| *errors = rekey_map(errors, name, shift));
                stores.focused.update(|focused| {
                    *focused = focused
                        .as_ref()
                        .and_then(|current| rekey_name(name, current, shift));
                });
            }
            tracing::debug!(form = %units.id, field = %name, op, "list edited");
            units.events.changed.emit(name.clone());
            Some(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(values: &[&'static str]) -> NameSet {
        values.iter().map(|value| FieldName::from(*value)).collect()
    }

    #[test]
    fn removal_drops_the_entry_and_shifts_later_ones() {
        let list = FieldName::from("tags");
        let dirty = names(&["email", "tags", "tags[0]", "tags[1]", "tags[2].label"]);
        assert_eq!(
            rekey_set(&dirty, &list, IndexShift::Removed(1)),
            names(&["email", "tags", "tags[0]", "tags[1].label"])
        );
    }

    #[test]
    fn insertion_moves_entries_at_and_after_the_index() {
        let list = FieldName::from("tags");
        let touched = names(&["tags[0]", "tags[1]", "tagsx[1]"]);
        assert_eq!(
            rekey_set(&touched, &list, IndexShift::Inserted(1)),
            names(&["tags[0]", "tags[2]", "tagsx[1]"])
        );
    }

    #[test]
    fn map_values_follow_their_entry() {
        let list = FieldName::from("tags");
        let errors = BTreeMap::from([
            (FieldName::from("tags[0]"), "first"),
            (FieldName::from("tags[3]"), "last"),
        ]);
        assert_eq!(
            rekey_map(&errors, &list, IndexShift::Removed(0)),
            BTreeMap::from([(FieldName::from("tags[2]"), "last")])
        );
    }
}
