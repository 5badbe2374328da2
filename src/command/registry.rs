//! Process-wide map from command action types to their implementations.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::Value;

use super::Exec;
use crate::action::ActionType;
use crate::error::ConfigError;

/// Static metadata shown in the command catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub description: &'static str,
    pub undoable: bool,
}

/// A catalog entry: metadata plus the JSON schema of the payload.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: ActionType,
    pub description: &'static str,
    pub undoable: bool,
    pub param_schema: Value,
}

#[derive(Clone, Copy)]
struct Entry {
    info: CommandInfo,
    construct: fn() -> Box<dyn Exec>,
    schema: fn() -> Value,
}

fn construct<C: Exec + Default + 'static>() -> Box<dyn Exec> {
    Box::new(C::default())
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

fn schema_value<T: JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or(empty_object_schema())
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<ActionType, Entry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `C` as the command for `kind`, taking payloads shaped like `P`.
    pub fn register<C, P>(&mut self, kind: ActionType, info: CommandInfo) -> Result<&mut Self, ConfigError>
    where
        C: Exec + Default + 'static,
        P: JsonSchema,
    {
        if !kind.is_command() {
            return Err(ConfigError::NotCommand(kind));
        }
        if self.entries.contains_key(&kind) {
            return Err(ConfigError::Duplicate(kind));
        }
        self.entries.insert(
            kind,
            Entry {
                info,
                construct: construct::<C>,
                schema: schema_value::<P>,
            },
        );
        Ok(self)
    }

    /// Swap the implementation already registered for `kind`.
    pub fn replace<C, P>(&mut self, kind: ActionType, info: CommandInfo) -> Result<&mut Self, ConfigError>
    where
        C: Exec + Default + 'static,
        P: JsonSchema,
    {
        if self.entries.remove(&kind).is_none() {
            return Err(ConfigError::Unregistered(kind));
        }
        self.register::<C, P>(kind, info)
    }

    /// Every command action type must have exactly one registration.
    pub fn build(self) -> Result<Registry, ConfigError> {
        if let Some(missing) = ActionType::ALL
            .iter()
            .copied()
            .find(|k| k.is_command() && !self.entries.contains_key(k))
        {
            return Err(ConfigError::Unregistered(missing));
        }
        Ok(Registry {
            entries: self.entries,
        })
    }
}

pub struct Registry {
    entries: BTreeMap<ActionType, Entry>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Registry {
    pub fn contains(&self, kind: ActionType) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ActionType> + '_ {
        self.entries.keys().copied()
    }

    pub fn info(&self, kind: ActionType) -> Option<CommandInfo> {
        self.entries.get(&kind).map(|e| e.info)
    }

    /// A fresh, unstarted instance of the command for `kind`.
    pub fn instantiate(&self, kind: ActionType) -> Result<Box<dyn Exec>, ConfigError> {
        self.entries
            .get(&kind)
            .map(|e| (e.construct)())
            .ok_or(ConfigError::Unregistered(kind))
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.entries
            .iter()
            .map(|(kind, e)| CatalogEntry {
                name: *kind,
                description: e.info.description,
                undoable: e.info.undoable,
                param_schema: (e.schema)(),
            })
            .collect()
    }
}

/// A builder holding every built-in command family.
pub fn standard_builder() -> Result<RegistryBuilder, ConfigError> {
    let mut builder = RegistryBuilder::new();
    super::item::register(&mut builder)?;
    super::photo::register(&mut builder)?;
    super::note::register(&mut builder)?;
    super::vocab::register(&mut builder)?;
    super::template::register(&mut builder)?;
    Ok(builder)
}

pub fn standard() -> Result<Registry, ConfigError> {
    standard_builder()?.build()
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Build the process registry. Idempotent.
pub fn init() -> Result<&'static Registry, ConfigError> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(registry);
    }
    let built = standard()?;
    Ok(REGISTRY.get_or_init(|| built))
}

pub fn global() -> Result<&'static Registry, ConfigError> {
    REGISTRY.get().ok_or(ConfigError::Uninitialized)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::command::item::ItemCreate;

    const INFO: CommandInfo = CommandInfo {
        description: "test",
        undoable: false,
    };

    #[test]
    fn standard_covers_every_command_type() {
        let registry = standard().unwrap();
        for kind in ActionType::ALL {
            assert_eq!(registry.contains(*kind), kind.is_command(), "{kind}");
        }
        let catalog = registry.catalog();
        assert_eq!(catalog.len(), registry.kinds().count());
        assert!(catalog.iter().all(|e| e.param_schema.is_object()));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .register::<ItemCreate, ()>(ActionType::ItemCreate, INFO)
            .unwrap();
        let err = builder
            .register::<ItemCreate, ()>(ActionType::ItemCreate, INFO)
            .err();
        assert_eq!(err, Some(ConfigError::Duplicate(ActionType::ItemCreate)));
    }

    #[test]
    fn non_command_types_cannot_be_registered() {
        let err = RegistryBuilder::new()
            .register::<ItemCreate, ()>(ActionType::ItemInsert, INFO)
            .err();
        assert_eq!(err, Some(ConfigError::NotCommand(ActionType::ItemInsert)));
    }

    #[test]
    fn incomplete_registry_fails_to_build() {
        let mut builder = RegistryBuilder::new();
        builder
            .register::<ItemCreate, ()>(ActionType::ItemCreate, INFO)
            .unwrap();
        assert!(matches!(builder.build(), Err(ConfigError::Unregistered(_))));
    }

    #[test]
    fn replace_requires_an_existing_entry() {
        let mut builder = RegistryBuilder::new();
        let err = builder
            .replace::<ItemCreate, ()>(ActionType::ItemCreate, INFO)
            .err();
        assert_eq!(err, Some(ConfigError::Unregistered(ActionType::ItemCreate)));

        let mut builder = standard_builder().unwrap();
        builder
            .replace::<ItemCreate, ()>(ActionType::ItemDelete, INFO)
            .unwrap();
        let registry = builder.build().unwrap();
        assert_eq!(registry.info(ActionType::ItemDelete), Some(INFO));
    }

    #[test]
    fn init_is_idempotent() {
        let a = init().unwrap();
        let b = init().unwrap();
        assert!(std::ptr::eq(a, b));
        assert!(std::ptr::eq(global().unwrap(), a));
    }
}
