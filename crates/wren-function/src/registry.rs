// FunctionRegistry — Create functions by name, arguments and context
//
// A registry maps a function name to a `FunctionEntry`: the declared argument
// signature plus one factory per element dtype. `create` validates the name,
// the argument count and kinds, then picks the factory for `ctx.dtype`.
//
// The process-wide registry is built lazily with every builtin function and can
// be extended with `register_function`. Registration is normally done once at
// startup; lookups take a read lock and never block each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use log::{debug, error, info};
use wren_core::{Context, DType, Error, Result};

use crate::args::{check_signature, Arg, ArgKind};
use crate::function::{Function, FunctionNode};
use crate::functions::builtin_entries;

/// Builds a function for a context from checked arguments.
pub type Factory = Arc<dyn Fn(&Context, &[Arg]) -> Result<Box<dyn Function>> + Send + Sync>;

/// One registered function name: its signature and per-dtype factories.
#[derive(Clone)]
pub struct FunctionEntry {
    name: String,
    signature: Vec<ArgKind>,
    impls: HashMap<DType, Factory>,
}

impl FunctionEntry {
    pub fn new(name: impl Into<String>, signature: Vec<ArgKind>) -> Self {
        FunctionEntry {
            name: name.into(),
            signature,
            impls: HashMap::new(),
        }
    }

    /// Add the implementation used when `ctx.dtype == dtype`.
    pub fn with_impl<F>(mut self, dtype: DType, factory: F) -> Self
    where
        F: Fn(&Context, &[Arg]) -> Result<Box<dyn Function>> + Send + Sync + 'static,
    {
        self.impls.insert(dtype, Arc::new(factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &[ArgKind] {
        &self.signature
    }

    /// Dtypes with an implementation, sorted by name.
    pub fn dtypes(&self) -> Vec<DType> {
        let mut dtypes: Vec<DType> = self.impls.keys().copied().collect();
        dtypes.sort_by_key(|d| d.to_string());
        dtypes
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("dtypes", &self.dtypes())
            .finish()
    }
}

/// Name → entry map.
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    entries: HashMap<String, FunctionEntry>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every builtin function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for entry in builtin_entries() {
            // Builtin names are unique; a collision would be a bug here.
            if let Err(e) = registry.register(entry) {
                error!("builtin registration failed: {e}");
            }
        }
        registry
    }

    /// Add an entry. Names are unique.
    pub fn register(&mut self, entry: FunctionEntry) -> Result<()> {
        if self.entries.contains_key(entry.name()) {
            return Err(Error::DuplicateFunction(entry.name));
        }
        debug!("registering {} with dtypes {:?}", entry.name, entry.dtypes());
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn signature(&self, name: &str) -> Option<&[ArgKind]> {
        self.entries.get(name).map(FunctionEntry::signature)
    }

    pub fn entry(&self, name: &str) -> Option<&FunctionEntry> {
        self.entries.get(name)
    }

    /// Build a fresh, not-yet-set-up function node.
    pub fn create(&self, name: &str, ctx: &Context, args: &[Arg]) -> Result<FunctionNode> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))?;
        check_signature(name, &entry.signature, args)?;
        let factory = entry.impls.get(&ctx.dtype).ok_or_else(|| Error::UnsupportedDType {
            function: name.to_string(),
            dtype: ctx.dtype,
        })?;
        let function = (factory.as_ref())(ctx, args)?;
        Ok(FunctionNode::new(function))
    }
}

static GLOBAL_REGISTRY: LazyLock<RwLock<FunctionRegistry>> = LazyLock::new(|| {
    let registry = FunctionRegistry::with_builtins();
    info!("function registry ready with {} functions", registry.names().len());
    RwLock::new(registry)
});

/// The process-wide registry.
pub fn global_registry() -> &'static RwLock<FunctionRegistry> {
    &GLOBAL_REGISTRY
}

/// Add an entry to the process-wide registry.
pub fn register_function(entry: FunctionEntry) -> Result<()> {
    GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(entry)
}

/// Create a function from the process-wide registry.
pub fn create_function(name: &str, ctx: &Context, args: &[Arg]) -> Result<FunctionNode> {
    GLOBAL_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .create(name, ctx, args)
}

/// Names in the process-wide registry, sorted.
pub fn function_names() -> Vec<String> {
    GLOBAL_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .names()
}
