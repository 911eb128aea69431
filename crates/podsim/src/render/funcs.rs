use core::fmt;
use std::collections::BTreeMap;

pub use gtmpl::{Func, FuncError, Value as TemplateValue};

/// Named functions made callable from template expressions.
///
/// # Example
/// ```
/// use podsim::{FuncError, Funcs, TemplateValue};
///
/// fn shout(args: &[TemplateValue]) -> Result<TemplateValue, FuncError> {
///     let text: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
///     Ok(TemplateValue::from(text.join(" ").to_uppercase()))
/// }
///
/// let funcs = Funcs::new().with("shout", shout);
/// assert_eq!(funcs.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct Funcs {
    entries: BTreeMap<String, Func>,
}

impl Funcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `func` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, func: Func) -> Self {
        self.insert(name, func);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, func: Func) {
        self.entries.insert(name.into(), func);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Func)> {
        self.entries.iter().map(|(name, func)| (name.as_str(), *func))
    }

    /// Identifies this exact set of functions, so templates compiled against
    /// it are not reused with a different set.
    pub(crate) fn fingerprint(&self) -> Vec<(String, usize)> {
        self.entries
            .iter()
            .map(|(name, func)| (name.clone(), *func as usize))
            .collect()
    }
}

impl fmt::Debug for Funcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
