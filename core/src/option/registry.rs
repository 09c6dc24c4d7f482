use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::error::OptionError;
use crate::platform::Platform;

use super::types::OptionValue;

type Dynamic = Arc<dyn Any + Send + Sync>;
type DefaultFn = Arc<dyn Fn() -> Result<Dynamic, String> + Send + Sync>;
type ParseFn = Arc<dyn Fn(&str) -> Result<Dynamic, String> + Send + Sync>;

/// Where an override came from. Higher layers win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OverrideLayer {
    ConfigFile,
    Environment,
    CommandLine,
}

enum DefaultSource {
    None,
    Value(Dynamic),
    Lazy(DefaultFn),
    PerPlatform(HashMap<Platform, DefaultFn>),
}

struct Entry {
    name: Arc<str>,
    doc: String,
    type_label: &'static str,
    default: DefaultSource,
    default_hint: Option<String>,
    parse: ParseFn,
}

/// A resolved value: `Unset` is remembered too, so factories run at most
/// once per run even when they produce nothing.
#[derive(Clone)]
enum Resolved {
    Unset,
    Value(Dynamic),
}

/// Declaration of a single option, consumed by [`Options::add`].
pub struct OptionSpec<T: OptionValue> {
    name: String,
    doc: String,
    default: DefaultSource,
    default_hint: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: OptionValue> OptionSpec<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            default: DefaultSource::None,
            default_hint: None,
            _marker: PhantomData,
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// A literal default value.
    pub fn default_value(mut self, value: T) -> Self {
        self.default_hint = Some(value.render());
        self.default = DefaultSource::Value(Arc::new(value));
        self
    }

    /// A lazily evaluated default, run at most once on first read.
    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.default_hint = Some("<computed>".to_string());
        self.default = DefaultSource::Lazy(erase_factory(factory));
        self
    }

    /// A default factory for one platform. May be called repeatedly to
    /// cover several platforms; only the current host's factory ever runs.
    pub fn default_for<F>(mut self, platform: Platform, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let map = match self.default {
            DefaultSource::PerPlatform(map) => map,
            _ => HashMap::new(),
        };
        let mut map = map;
        map.insert(platform, erase_factory(factory));
        self.default_hint = Some("<platform-dependent>".to_string());
        self.default = DefaultSource::PerPlatform(map);
        self
    }
}

fn erase_factory<T, F>(factory: F) -> DefaultFn
where
    T: OptionValue,
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
{
    Arc::new(move || {
        factory()
            .map(|v| Arc::new(v) as Dynamic)
            .map_err(|e| format!("{e:#}"))
    })
}

/// Typed handle to a registered option.
pub struct OptionHandle<T: OptionValue> {
    name: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: OptionValue> Clone for OptionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: OptionValue> std::fmt::Debug for OptionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionHandle")
            .field("name", &self.name)
            .finish()
    }
}

impl<T: OptionValue> OptionHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the effective value, failing if the option is unset.
    pub fn get(&self, options: &Options) -> Result<T, OptionError> {
        self.get_opt(options)?
            .ok_or_else(|| OptionError::NoValue(self.name.to_string()))
    }

    /// Resolve the effective value, or `fallback` if the option is unset.
    pub fn get_or(&self, options: &Options, fallback: T) -> Result<T, OptionError> {
        Ok(self.get_opt(options)?.unwrap_or(fallback))
    }

    /// Resolve the effective value; `None` means no override and no
    /// default applies on this host.
    pub fn get_opt(&self, options: &Options) -> Result<Option<T>, OptionError> {
        match options.resolve(&self.name)? {
            Resolved::Unset => Ok(None),
            Resolved::Value(v) => match v.downcast_ref::<T>() {
                Some(value) => Ok(Some(value.clone())),
                None => Err(OptionError::Parse {
                    name: self.name.to_string(),
                    expected: T::LABEL,
                    message: "option was registered with a different type".to_string(),
                }),
            },
        }
    }
}

/// Listing entry for `--list-options`.
#[derive(Debug, Clone)]
pub struct OptionInfo {
    pub name: String,
    pub doc: String,
    pub type_label: &'static str,
    pub default_hint: Option<String>,
}

/// Process-wide registry of typed options.
///
/// Declarations happen at startup through [`Options::add`]; overrides are
/// applied before the run starts; each option resolves at most once and is
/// immutable afterward.
#[derive(Default)]
pub struct Options {
    entries: Vec<Entry>,
    index: HashMap<Arc<str>, usize>,
    overrides: Mutex<HashMap<String, (OverrideLayer, String)>>,
    resolved: Mutex<HashMap<usize, Resolved>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an option. Fails if the name is taken.
    pub fn add<T: OptionValue>(
        &mut self,
        spec: OptionSpec<T>,
    ) -> Result<OptionHandle<T>, OptionError> {
        if self.index.contains_key(spec.name.as_str()) {
            return Err(OptionError::Duplicate(spec.name));
        }

        let name: Arc<str> = spec.name.into();
        let entry = Entry {
            name: name.clone(),
            doc: spec.doc,
            type_label: T::LABEL,
            default: spec.default,
            default_hint: spec.default_hint,
            parse: Arc::new(|raw| T::parse(raw).map(|v| Arc::new(v) as Dynamic)),
        };

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(entry);

        Ok(OptionHandle {
            name,
            _marker: PhantomData,
        })
    }

    /// Record an override for a registered option. The raw string is
    /// parsed lazily, on first read of the option. A lower layer never
    /// replaces a higher one.
    pub fn set_override(
        &self,
        name: &str,
        raw: impl Into<String>,
        layer: OverrideLayer,
    ) -> Result<(), OptionError> {
        if !self.index.contains_key(name) {
            return Err(OptionError::Unknown(name.to_string()));
        }
        let mut overrides = lock(&self.overrides);
        match overrides.get(name) {
            Some((existing, _)) if *existing > layer => {}
            _ => {
                overrides.insert(name.to_string(), (layer, raw.into()));
            }
        }
        Ok(())
    }

    /// Apply `DAGRUN_OPT_*` environment overrides for every registered
    /// option that has one set.
    pub fn apply_env_overrides(&self) -> Result<(), OptionError> {
        let names: Vec<Arc<str>> = self.index.keys().cloned().collect();
        for name in names {
            if let Ok(raw) = std::env::var(Self::env_key(&name)) {
                if !raw.trim().is_empty() {
                    self.set_override(&name, raw, OverrideLayer::Environment)?;
                }
            }
        }
        Ok(())
    }

    /// The environment variable consulted for an option name.
    pub fn env_key(name: &str) -> String {
        let mapped: String = name
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        format!("DAGRUN_OPT_{mapped}")
    }

    /// Enumerate registered options in declaration order.
    pub fn list(&self) -> Vec<OptionInfo> {
        self.entries
            .iter()
            .map(|e| OptionInfo {
                name: e.name.to_string(),
                doc: e.doc.clone(),
                type_label: e.type_label,
                default_hint: e.default_hint.clone(),
            })
            .collect()
    }

    fn resolve(&self, name: &Arc<str>) -> Result<Resolved, OptionError> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| OptionError::Unknown(name.to_string()))?;

        if let Some(resolved) = lock(&self.resolved).get(&idx) {
            return Ok(resolved.clone());
        }

        let entry = &self.entries[idx];
        let override_raw = lock(&self.overrides).get(name.as_ref()).map(|(_, raw)| raw.clone());

        let resolved = if let Some(raw) = override_raw {
            let value = (entry.parse)(&raw).map_err(|message| OptionError::Parse {
                name: name.to_string(),
                expected: entry.type_label,
                message,
            })?;
            Resolved::Value(value)
        } else {
            match &entry.default {
                DefaultSource::None => Resolved::Unset,
                DefaultSource::Value(v) => Resolved::Value(v.clone()),
                DefaultSource::Lazy(factory) => Resolved::Value(run_factory(name, factory)?),
                DefaultSource::PerPlatform(map) => match map.get(&Platform::current()) {
                    Some(factory) => Resolved::Value(run_factory(name, factory)?),
                    None => Resolved::Unset,
                },
            }
        };

        lock(&self.resolved).insert(idx, resolved.clone());
        Ok(resolved)
    }
}

fn run_factory(name: &str, factory: &DefaultFn) -> Result<Dynamic, OptionError> {
    factory().map_err(|message| OptionError::Default {
        name: name.to_string(),
        message,
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
