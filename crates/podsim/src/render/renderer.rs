use std::collections::HashMap;
use std::sync::Arc;

use gtmpl::{Context, Template};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::convert::{to_template_value, yaml_to_json};
use crate::{BufferPool, Error, Funcs, Result, lock::RwLock};

/// Renders Go-style `text/template` templates against structured input and
/// returns the output as canonical JSON.
///
/// A render goes through four steps:
///
/// 1. The trimmed template text is compiled together with the supplied
///    [`Funcs`], or fetched from the compiled-template cache.
/// 2. The input is normalized by encoding it to JSON and decoding it back
///    into a generic tree, so templates see serialized field names. Numbers
///    keep their full precision.
/// 3. The template is executed against that tree.
/// 4. The output, parsed as YAML (a superset of JSON), is re-encoded as JSON
///    with sorted object keys.
///
/// Scratch buffers for steps 2 and 3 come from a [`BufferPool`] owned by the
/// renderer.
///
/// # Example
/// ```
/// use podsim::{Funcs, Renderer};
/// use serde_json::json;
///
/// let renderer = Renderer::new();
/// let patch = renderer
///     .render(
///         "status:\n  podIP: {{ .ip }}\n  phase: Running",
///         &json!({"ip": "10.0.0.7"}),
///         &Funcs::new(),
///     )
///     .unwrap();
///
/// assert_eq!(patch, br#"{"status":{"phase":"Running","podIP":"10.0.0.7"}}"#);
/// ```
#[derive(Default)]
pub struct Renderer {
    templates: RwLock<HashMap<TemplateKey, Arc<Template>>>,
    pub(crate) buffers: BufferPool,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct TemplateKey {
    text: String,
    funcs: Vec<(String, usize)>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer that keeps at most `limit` idle scratch buffers.
    pub fn with_buffer_limit(limit: usize) -> Self {
        Self {
            templates: RwLock::default(),
            buffers: BufferPool::new(limit),
        }
    }

    /// Renders `text` against `input` and returns canonical JSON bytes.
    ///
    /// # Errors
    /// - [`Error::TemplateParse`] if the template does not compile.
    /// - [`Error::Normalize`] if `input` cannot round-trip through JSON.
    /// - [`Error::TemplateExec`] if execution fails.
    /// - [`Error::Convert`] if the output is not valid YAML/JSON. The error
    ///   carries the rendered text.
    pub fn render<T>(&self, text: &str, input: &T, funcs: &Funcs) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        let document = self.render_value(text, input, funcs)?;
        serde_json::to_vec(&document).map_err(|e| Error::Convert {
            reason: e.to_string(),
            rendered: document.to_string(),
        })
    }

    /// Like [`Renderer::render`], but returns the decoded JSON document.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn render_value<T>(&self, text: &str, input: &T, funcs: &Funcs) -> Result<serde_json::Value>
    where
        T: Serialize + ?Sized,
    {
        let template = self.compile(text.trim(), funcs)?;
        let data = self.normalize(input)?;

        let mut rendered = self.buffers.get();
        template
            .execute(&mut *rendered, &Context::from(data))
            .map_err(|e| Error::TemplateExec(e.to_string()))?;

        yaml_to_json(&rendered).map_err(|reason| Error::Convert {
            reason,
            rendered: String::from_utf8_lossy(&rendered).into_owned(),
        })
    }

    /// Number of compiled templates held in the cache.
    pub fn cached_templates(&self) -> usize {
        self.templates.read().len()
    }

    pub fn clear_cache(&self) {
        self.templates.write().clear();
    }

    fn compile(&self, text: &str, funcs: &Funcs) -> Result<Arc<Template>> {
        let key = TemplateKey {
            text: text.to_owned(),
            funcs: funcs.fingerprint(),
        };
        if let Some(template) = self.templates.read().get(&key) {
            return Ok(Arc::clone(template));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(len = text.len(), funcs = ?funcs, "compiling template");

        let mut template = Template::default();
        for (name, func) in funcs.iter() {
            template.add_func(name, func);
        }
        template
            .parse(text)
            .map_err(|e| Error::TemplateParse(e.to_string()))?;

        let mut templates = self.templates.write();
        let template = templates.entry(key).or_insert_with(|| Arc::new(template));
        Ok(Arc::clone(template))
    }

    fn normalize<T>(&self, input: &T) -> Result<gtmpl::Value>
    where
        T: Serialize + ?Sized,
    {
        let mut scratch = self.buffers.get();
        serde_json::to_writer(&mut *scratch, input).map_err(|e| Error::Normalize(e.to_string()))?;
        let tree: serde_json::Value =
            serde_json::from_slice(&scratch).map_err(|e| Error::Normalize(e.to_string()))?;
        Ok(to_template_value(tree))
    }
}
