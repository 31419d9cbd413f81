use super::config::FormConfig;
use super::controller::{Form, FormResult};
use super::field::FormModel;

/// Extends every form a [`FormFactory`] creates.
///
/// `extend` receives the finished form and returns what the factory hands
/// out, typically the form together with extra stores or events wired to it.
pub trait FormPlugin<T: FormModel>: Send + Sync {
    type Extended;

    /// Plugin identifier for logging.
    fn id(&self) -> &str;

    fn extend(&self, form: Form<T>) -> FormResult<Self::Extended>;
}

/// Leaves the form as it is.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPlugin;

impl<T: FormModel> FormPlugin<T> for NoPlugin {
    type Extended = Form<T>;

    fn id(&self) -> &str {
        "none"
    }

    fn extend(&self, form: Form<T>) -> FormResult<Form<T>> {
        Ok(form)
    }
}

/// Creates forms sharing one configuration and one plugin.
#[derive(Clone, Debug)]
pub struct FormFactory<P> {
    config: FormConfig,
    plugin: P,
}

impl FormFactory<NoPlugin> {
    pub fn new(config: FormConfig) -> Self {
        Self {
            config,
            plugin: NoPlugin,
        }
    }
}

impl<P> FormFactory<P> {
    pub fn with_plugin<Q>(self, plugin: Q) -> FormFactory<Q> {
        FormFactory {
            config: self.config,
            plugin,
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    pub fn create<T>(&self, initial: T) -> FormResult<P::Extended>
    where
        T: FormModel,
        P: FormPlugin<T>,
    {
        let form = Form::new(initial, self.config.clone())?;
        tracing::debug!(form = %form.id(), plugin = self.plugin.id(), "extending form");
        self.plugin.extend(form)
    }
}
