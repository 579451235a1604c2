// ============================================================================
// Optimistic Saves
// ============================================================================
//
// Every saved row carries `version_dynamap_`. A save bumps the local version
// and writes the row under a condition on the stored version, so a handle
// that read version N can only overwrite a row still at version N. When the
// store rejects the condition the save fails with `ConcurrencyConflict`.
// Whatever the failure, the local version is put back.
//
// ============================================================================

use super::attributes::VERSION_ATTR;
use super::object::{LoadState, PersistentObject};
use crate::codec::item_to_store_safe;
use crate::core::{Item, MapperError, Result, Value};
use crate::storage::{Condition, WriteOutcome, attr};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Create the row, or update it if the stored version still matches.
    #[default]
    Upsert,
    /// Fail if the row exists.
    CreateOnly,
    /// Fail if the row is missing or its version moved on.
    UpdateOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    pub mode: SaveMode,
    /// Skip the version comparison.
    pub force: bool,
    /// Do nothing when there are no pending changes.
    pub only_if_dirty: bool,
}

impl SaveOptions {
    pub fn upsert() -> Self {
        Self::default()
    }

    pub fn create() -> Self {
        Self {
            mode: SaveMode::CreateOnly,
            ..Self::default()
        }
    }

    pub fn update() -> Self {
        Self {
            mode: SaveMode::UpdateOnly,
            ..Self::default()
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn only_if_dirty(mut self, only_if_dirty: bool) -> Self {
        self.only_if_dirty = only_if_dirty;
        self
    }

    /// Write precondition for a row last read at `version`.
    ///
    /// A forced update still requires the row to exist; a forced upsert has
    /// no condition at all.
    pub fn condition(&self, version: i64) -> Option<Condition> {
        let absent = attr(VERSION_ATTR).not_exists();
        let current = if self.force {
            attr(VERSION_ATTR).exists()
        } else {
            attr(VERSION_ATTR).eq(version)
        };
        match (self.mode, self.force) {
            (SaveMode::Upsert, true) => None,
            (SaveMode::Upsert, false) => Some(absent.or(current)),
            (SaveMode::UpdateOnly, _) => Some(current),
            (SaveMode::CreateOnly, _) => Some(absent),
        }
    }
}

impl PersistentObject {
    /// Create-or-update under the version check.
    pub fn save(&mut self) -> Result<()> {
        self.save_with(SaveOptions::upsert()).map(|_| ())
    }

    /// Fails with `ConcurrencyConflict` if the row already exists.
    pub fn create(&mut self) -> Result<()> {
        self.save_with(SaveOptions::create()).map(|_| ())
    }

    /// Fails with `ConcurrencyConflict` if the row is missing or was saved
    /// by someone else since this object read it.
    pub fn update(&mut self) -> Result<()> {
        self.save_with(SaveOptions::update()).map(|_| ())
    }

    /// Saves only when something changed. Returns whether a write happened.
    pub fn save_if_dirty(&mut self) -> Result<bool> {
        self.save_with(SaveOptions::upsert().only_if_dirty(true))
    }

    /// Returns whether a write happened.
    pub fn save_with(&mut self, options: SaveOptions) -> Result<bool> {
        self.ensure_resolved()?;
        if options.only_if_dirty && !self.is_dirty() {
            return Ok(false);
        }

        let schema = self.schema()?;
        let view = self.save_view()?;
        let missing: Vec<String> = schema
            .required_attributes()?
            .into_iter()
            .filter(|name| view.get(name).is_none_or(Value::is_empty_value))
            .collect();
        if !missing.is_empty() {
            return Err(MapperError::Validation(format!(
                "the following attributes are missing and must be set before saving {}: {}",
                self.type_name(),
                missing.join(", ")
            )));
        }

        let mut item = item_to_store_safe(&view)?;
        let old_version = self.version;
        let condition = options.condition(old_version);

        self.version = old_version.checked_add(1).ok_or_else(|| {
            MapperError::Validation(format!(
                "{} of {} cannot be incremented past {}",
                VERSION_ATTR,
                self.type_name(),
                old_version
            ))
        })?;
        item.insert(VERSION_ATTR.to_string(), Value::Int(self.version));

        debug!(
            "Saving {} to {} at version {} ({:?})",
            self.type_name(),
            schema.table_name,
            self.version,
            options.mode
        );
        let outcome = self
            .mapper
            .gateway()
            .put_item(&schema.table_name, item, condition.as_ref());

        match outcome {
            Ok(WriteOutcome::Written) => {
                self.mark_saved(view);
                Ok(true)
            }
            Ok(WriteOutcome::ConditionFailed) => {
                self.version = old_version;
                let message = self.conflict_message(&schema.table_name, options, old_version);
                warn!("{}", message);
                Err(MapperError::ConcurrencyConflict {
                    table: schema.table_name.clone(),
                    message,
                })
            }
            Err(err) => {
                self.version = old_version;
                Err(err)
            }
        }
    }

    fn mark_saved(&mut self, view: Item) {
        self.persisted = view;
        self.changes.clear();
        self.in_db = true;
        self.state = LoadState::Resolved;
    }

    fn conflict_message(&self, table: &str, options: SaveOptions, version: i64) -> String {
        let key = self
            .key()
            .ok()
            .map(|key| {
                key.values()
                    .map(|value| value.to_string())
                    .collect::<Vec<_>>()
                    .join(":")
            })
            .unwrap_or_default();
        match options.mode {
            SaveMode::CreateOnly => format!(
                "Optimistic lock conflict for '{}:{}': row already exists",
                table, key
            ),
            _ if options.force => format!(
                "Optimistic lock conflict for '{}:{}': row does not exist",
                table, key
            ),
            _ => format!(
                "Optimistic lock conflict for '{}:{}': expected version {}",
                table, key, version
            ),
        }
    }

    /// Removes the row, optionally guarded by `condition`.
    ///
    /// The object keeps its attributes, all of them pending, so a later save
    /// writes the row again.
    pub fn delete_item(&mut self, condition: Option<&Condition>) -> Result<()> {
        let schema = self.schema()?;
        let key = self.key()?;
        match self
            .mapper
            .gateway()
            .delete_item(&schema.table_name, &key, condition)?
        {
            WriteOutcome::Written => {
                self.mark_deleted();
                Ok(())
            }
            WriteOutcome::ConditionFailed => {
                let message = format!(
                    "delete of {} rejected: condition on the stored row does not hold",
                    self.type_name()
                );
                warn!("{}", message);
                Err(MapperError::ConcurrencyConflict {
                    table: schema.table_name.clone(),
                    message,
                })
            }
        }
    }

    fn mark_deleted(&mut self) {
        self.changes = self.attributes.fields().map(str::to_string).collect();
        self.persisted.clear();
        self.in_db = false;
        self.version = 0;
        self.state = LoadState::Resolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_matrix() {
        let v = 3;
        assert_eq!(
            SaveOptions::upsert().condition(v),
            Some(attr(VERSION_ATTR).not_exists().or(attr(VERSION_ATTR).eq(3)))
        );
        assert_eq!(SaveOptions::upsert().force(true).condition(v), None);
        assert_eq!(
            SaveOptions::update().condition(v),
            Some(attr(VERSION_ATTR).eq(3))
        );
        assert_eq!(
            SaveOptions::update().force(true).condition(v),
            Some(attr(VERSION_ATTR).exists())
        );
        assert_eq!(
            SaveOptions::create().condition(v),
            Some(attr(VERSION_ATTR).not_exists())
        );
        assert_eq!(
            SaveOptions::create().force(true).condition(v),
            Some(attr(VERSION_ATTR).not_exists())
        );
    }
}
