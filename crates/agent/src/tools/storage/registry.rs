//! Operation registry
//!
//! Maps operation names to implementations and folds every operation's
//! parameter fragment into the single schema the storage tool advertises.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::operations::BuiltinOperation;
use super::{ObjectRef, StorageClient, StoreError};

/// One sub-capability of the storage tool
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &str;

    /// Top-level properties this operation reads from the tool arguments
    fn parameter_schema(&self) -> Map<String, Value>;

    /// Whether a bucket and key must be supplied
    fn requires_object(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        client: &StorageClient,
        object: Option<&ObjectRef>,
        args: &Map<String, Value>,
    ) -> Result<Value, StoreError>;
}

/// Operations in registration order
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: Vec<Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in operation
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for operation in BuiltinOperation::ALL {
            registry.register(operation);
        }
        registry
    }

    /// Add an operation; a same-named one is replaced in place
    pub fn register<O: Operation + 'static>(&mut self, operation: O) {
        self.register_arc(Arc::new(operation));
    }

    pub fn register_arc(&mut self, operation: Arc<dyn Operation>) {
        match self
            .operations
            .iter_mut()
            .find(|op| op.name() == operation.name())
        {
            Some(slot) => {
                debug!("replacing operation {}", operation.name());
                *slot = operation;
            }
            None => self.operations.push(operation),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn Operation> {
        self.operations
            .iter()
            .find(|op| op.name() == name)
            .map(|op| op.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| op.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Schema with an `operation` enum plus the union of all fragments.
    ///
    /// A property declared identically by several operations appears once.
    /// Differing declarations of the same property are combined into
    /// `{"anyOf": [...]}` in registration order.
    pub fn merged_schema(&self) -> Value {
        let mut merged: Vec<(String, Vec<Value>)> = Vec::new();

        for operation in &self.operations {
            for (key, fragment) in operation.parameter_schema() {
                if key == "operation" {
                    continue;
                }
                match merged.iter_mut().find(|(name, _)| *name == key) {
                    Some((_, variants)) => {
                        if !variants.contains(&fragment) {
                            variants.push(fragment);
                        }
                    }
                    None => merged.push((key, vec![fragment])),
                }
            }
        }

        let mut properties = Map::new();
        properties.insert(
            "operation".to_string(),
            json!({
                "type": "string",
                "enum": self.names(),
                "description": "The operation to perform"
            }),
        );

        for (key, mut variants) in merged {
            let schema = if variants.len() == 1 {
                variants.remove(0)
            } else {
                json!({ "anyOf": variants })
            };
            properties.insert(key, schema);
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": ["operation"]
        })
    }
}
