//! The function registry: name → transform, kind and default parameters.
//!
//! The catalog of concrete frame operations lives outside the core; all the
//! compiler and runtime need is to look a name up, learn its
//! [`FunctionKind`], and call the transform through one uniform interface.
//! The registry is populated once at process start and read-only afterwards,
//! so it is shared as an `Arc` with no locking.
//!
//! # Example
//!
//! ```
//! use vidflow_core::registry::{processor_fn, FunctionRegistry, FunctionSpec};
//! use serde_json::json;
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register(
//!     "brighten",
//!     FunctionSpec::processor(processor_fn(|frame, params| {
//!         let _gain = params.get("gain").and_then(|v| v.as_f64()).unwrap_or(1.0);
//!         // ... adjust pixels ...
//!         Ok(Some(frame))
//!     }))
//!     .with_default("gain", json!(1.2)),
//! );
//! assert!(registry.contains("brighten"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransformError;
use crate::frame::Frame;

/// Keyword parameters as handed to transforms.
pub type Params = HashMap<String, Value>;

/// Node kinds by input/output arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Produces frames; zero inputs.
    Source,
    /// Transforms frames; at least one input and one output.
    Processor,
    /// Consumes frames for side effects; zero outputs.
    Sink,
}

impl std::fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FunctionKind::Source => "source",
            FunctionKind::Processor => "processor",
            FunctionKind::Sink => "sink",
        })
    }
}

/// The uniform call interface for frame operations.
///
/// Sources are called with `None` and return a frame (or `None` when their
/// stream is exhausted). Processors receive a frame and return the
/// transformed frame, or `None` to drop it. Sinks receive a frame and
/// return `None`. Transforms are synchronous and treated as CPU-bound by
/// the runtime.
pub trait Transform: Send + Sync {
    /// One-time preflight before the run starts.
    ///
    /// A source that cannot produce at all (missing hardware, bad
    /// configuration) reports it here, which aborts the run before any
    /// worker is spawned.
    fn start(&self, _params: &Params) -> Result<(), TransformError> {
        Ok(())
    }

    /// Process one frame (or produce one, for sources).
    fn apply(&self, input: Option<Frame>, params: &Params) -> Result<Option<Frame>, TransformError>;
}

/// A registered function: its kind, transform, and declared defaults.
///
/// Default parameters are merged under a call's `with (...)` clause at
/// compile time; parameter keys the function never declared are forwarded
/// verbatim (with a warning) rather than rejected.
#[derive(Clone)]
pub struct FunctionSpec {
    pub kind: FunctionKind,
    pub defaults: Params,
    pub transform: Arc<dyn Transform>,
}

impl FunctionSpec {
    pub fn new(kind: FunctionKind, transform: Arc<dyn Transform>) -> Self {
        Self {
            kind,
            defaults: Params::new(),
            transform,
        }
    }

    pub fn source(transform: Arc<dyn Transform>) -> Self {
        Self::new(FunctionKind::Source, transform)
    }

    pub fn processor(transform: Arc<dyn Transform>) -> Self {
        Self::new(FunctionKind::Processor, transform)
    }

    pub fn sink(transform: Arc<dyn Transform>) -> Self {
        Self::new(FunctionKind::Sink, transform)
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("kind", &self.kind)
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Process-wide mapping from function name to [`FunctionSpec`].
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, spec: FunctionSpec) {
        self.functions.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FunctionKind> {
        self.functions.get(name).map(|spec| spec.kind)
    }

    /// All registered names, sorted for stable listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }
}

struct FnTransform<F> {
    f: F,
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(Option<Frame>, &Params) -> Result<Option<Frame>, TransformError> + Send + Sync,
{
    fn apply(&self, input: Option<Frame>, params: &Params) -> Result<Option<Frame>, TransformError> {
        (self.f)(input, params)
    }
}

/// Wraps a producing closure as a source transform.
pub fn source_fn<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(&Params) -> Result<Option<Frame>, TransformError> + Send + Sync + 'static,
{
    Arc::new(FnTransform {
        f: move |_input: Option<Frame>, params: &Params| f(params),
    })
}

/// Wraps a frame-to-frame closure as a processor transform.
pub fn processor_fn<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(Frame, &Params) -> Result<Option<Frame>, TransformError> + Send + Sync + 'static,
{
    Arc::new(FnTransform {
        f: move |input: Option<Frame>, params: &Params| {
            let frame = input.ok_or_else(|| TransformError::new("processor received no frame"))?;
            f(frame, params)
        },
    })
}

/// Wraps a consuming closure as a sink transform.
pub fn sink_fn<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(Frame, &Params) -> Result<(), TransformError> + Send + Sync + 'static,
{
    Arc::new(FnTransform {
        f: move |input: Option<Frame>, params: &Params| {
            let frame = input.ok_or_else(|| TransformError::new("sink received no frame"))?;
            f(frame, params)?;
            Ok(None)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_and_kind_query() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            "cam",
            FunctionSpec::source(source_fn(|_| Ok(Some(Frame::empty())))),
        );
        registry.register(
            "show",
            FunctionSpec::sink(sink_fn(|_, _| Ok(()))).with_default("window_name", json!("main")),
        );

        assert_eq!(registry.kind_of("cam"), Some(FunctionKind::Source));
        assert_eq!(registry.kind_of("show"), Some(FunctionKind::Sink));
        assert_eq!(registry.kind_of("nope"), None);
        assert_eq!(registry.names(), vec!["cam".to_string(), "show".to_string()]);
        assert_eq!(
            registry.get("show").unwrap().defaults["window_name"],
            json!("main")
        );
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", FunctionSpec::source(source_fn(|_| Ok(None))));
        registry.register("f", FunctionSpec::sink(sink_fn(|_, _| Ok(()))));
        assert_eq!(registry.kind_of("f"), Some(FunctionKind::Sink));
    }

    #[test]
    fn processor_fn_rejects_missing_input() {
        let transform = processor_fn(|frame, _| Ok(Some(frame)));
        let err = transform.apply(None, &Params::new()).unwrap_err();
        assert!(err.message.contains("no frame"));
    }

    #[test]
    fn default_start_is_ok() {
        let transform = source_fn(|_| Ok(Some(Frame::empty())));
        assert!(transform.start(&Params::new()).is_ok());
    }
}
