use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};

use super::controller::{Form, FormError, FormId, FormResult};
use super::field::FormModel;

/// Persistence for unsaved form values, keyed by form.
pub trait FormDraftStore<T>: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save(&self, form_id: FormId, model: &T) -> Result<(), Self::Error>;
    fn load(&self, form_id: FormId) -> Result<Option<T>, Self::Error>;
    fn clear(&self, form_id: FormId) -> Result<(), Self::Error>;
}

#[derive(Clone)]
pub struct InMemoryDraftStore<T> {
    state: Arc<RwLock<BTreeMap<FormId, T>>>,
}

impl<T> InMemoryDraftStore<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<T> Default for InMemoryDraftStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FormDraftStore<T> for InMemoryDraftStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Error = Infallible;

    fn save(&self, form_id: FormId, model: &T) -> Result<(), Self::Error> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.insert(form_id, model.clone());
        Ok(())
    }

    fn load(&self, form_id: FormId) -> Result<Option<T>, Self::Error> {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let value = state.get(&form_id).cloned();
        Ok(value)
    }

    fn clear(&self, form_id: FormId) -> Result<(), Self::Error> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.remove(&form_id);
        Ok(())
    }
}

impl<T: FormModel> Form<T> {
    pub fn save_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: FormDraftStore<T>,
    {
        let values = self.values();
        store
            .save(self.id(), &values)
            .map_err(|error| FormError::DraftSaveFailed(error.to_string()))?;
        tracing::debug!(form = %self.id(), "draft saved");
        Ok(())
    }

    /// Restores a saved draft with `put`, so no field becomes dirty. Returns
    /// whether a draft existed.
    pub fn load_draft<S>(&self, store: &S) -> FormResult<bool>
    where
        S: FormDraftStore<T>,
    {
        let Some(draft) = store
            .load(self.id())
            .map_err(|error| FormError::DraftLoadFailed(error.to_string()))?
        else {
            return Ok(false);
        };
        self.put(draft);
        tracing::debug!(form = %self.id(), "draft restored");
        Ok(true)
    }

    pub fn clear_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: FormDraftStore<T>,
    {
        store
            .clear(self.id())
            .map_err(|error| FormError::DraftClearFailed(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("storage unavailable")]
    struct Unavailable;

    struct BrokenStore;

    impl FormDraftStore<u32> for BrokenStore {
        type Error = Unavailable;

        fn save(&self, _form_id: FormId, _model: &u32) -> Result<(), Self::Error> {
            Err(Unavailable)
        }

        fn load(&self, _form_id: FormId) -> Result<Option<u32>, Self::Error> {
            Err(Unavailable)
        }

        fn clear(&self, _form_id: FormId) -> Result<(), Self::Error> {
            Err(Unavailable)
        }
    }

    #[test]
    fn in_memory_store_keeps_drafts_per_form() {
        let store = InMemoryDraftStore::<u32>::new();
        let first = FormId::next();
        let second = FormId::next();
        store.save(first, &1).expect("save");
        assert_eq!(store.load(first).expect("load"), Some(1));
        assert_eq!(store.load(second).expect("load"), None);
        store.clear(first).expect("clear");
        assert_eq!(store.load(first).expect("load"), None);
    }

    #[test]
    fn store_failures_map_to_form_errors() {
        let store = BrokenStore;
        let error = store.load(FormId::next()).map_err(|error| {
            FormError::DraftLoadFailed(error.to_string())
        });
        assert_eq!(
            error,
            Err(FormError::DraftLoadFailed("storage unavailable".into()))
        );
        assert!(store.save(FormId::next(), &3).is_err());
        assert!(store.clear(FormId::next()).is_err());
    }
}
