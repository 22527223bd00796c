use crate::{
    AsType, AssociationEventKind, Draft, Entity, EntityEvent, Event, Executor, IdGeneration,
    ImmutableType, MiddleTable, OrmError, PropKind, PropValue, Result, SqlClient, Value,
    draft::coerce,
    lit_int,
    trigger::{association_event, reference_change_events},
};
use indexmap::IndexSet;
use std::fmt::Display;
use uuid::Uuid;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Insert,
    Update,
    /// Update when the row is found by its id, or by its key props when the id is not loaded.
    /// Insert otherwise.
    #[default]
    Upsert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    /// The saved snapshot, with the interceptor assignments and the generated id.
    pub entity: Entity,
    pub is_new: bool,
    /// Rows touched in the table of the entity.
    pub affected_rows: u64,
}

pub(crate) fn log_error(error: crate::Error) -> crate::Error {
    log::error!("{error:#}");
    error
}

pub(crate) fn expect_rows(expected: u64, actual: u64, context: impl Display) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    let error = OrmError::UnexpectedRowCount { expected, actual };
    log::error!("{context}: {error}");
    Err(error.into())
}

fn loaded_id(entity: &Entity, ty: &ImmutableType) -> Result<Option<Value>> {
    Ok(entity
        .scalar(ty.id_prop()?.key())
        .filter(|v| !v.is_null())
        .cloned())
}

fn reference_id(client: &SqlClient, value: Option<&PropValue>) -> Result<Option<Value>> {
    match value {
        Some(PropValue::Reference(Some(target))) => Ok(Some(target.id(client.schema())?)),
        _ => Ok(None),
    }
}

impl SqlClient {
    pub async fn save<E: Executor>(
        &self,
        executor: &mut E,
        entity: Entity,
        mode: SaveMode,
    ) -> Result<SaveResult> {
        self.save_with_reason(executor, entity, mode, None).await
    }

    /// Saves the loaded props of `entity`, `reason` is handed to the listeners of the events.
    ///
    /// Interceptors run once, before any statement is built. Only the props loaded after the
    /// interceptors ran are written, loaded many-to-many lists are synchronised with their
    /// middle table.
    pub async fn save_with_reason<E: Executor>(
        &self,
        executor: &mut E,
        entity: Entity,
        mode: SaveMode,
        reason: Option<&str>,
    ) -> Result<SaveResult> {
        let schema = self.schema();
        let ty = schema.ty(entity.type_key())?;
        let id_prop = ty.id_prop()?;
        let mut entity = entity;
        let given_id = loaded_id(&entity, ty)?;
        let is_new = match (mode, &given_id) {
            (SaveMode::Insert, _) => true,
            (SaveMode::Update, None) => {
                return Err(log_error(OrmError::invalid_draft(format!(
                    "cannot update a `{}` whose id is not loaded",
                    ty.name()
                ))));
            }
            (SaveMode::Update, Some(..)) => false,
            (SaveMode::Upsert, None) => match self.id_by_key(executor, ty, &entity).await? {
                Some(id) => {
                    entity.set_slot(id_prop.key(), PropValue::Scalar(id))?;
                    false
                }
                None => true,
            },
            (SaveMode::Upsert, Some(id)) => !self.exists(executor, ty, id.clone()).await?,
        };

        let mut draft = Draft::of(schema, entity)?;
        for interceptor in self.interceptors_of(ty.key()) {
            interceptor.before_save(&mut draft, is_new)?;
        }
        let (mut entity, _) = draft.resolve();

        let mut id = loaded_id(&entity, ty)?;
        if id.is_none() {
            if !is_new {
                return Err(log_error(OrmError::invalid_draft(format!(
                    "the id of the updated `{}` was unloaded",
                    ty.name()
                ))));
            }
            match ty.id_generation() {
                IdGeneration::Uuid => {
                    let generated = Value::Uuid(Some(Uuid::new_v4()));
                    entity.set_slot(id_prop.key(), PropValue::Scalar(generated.clone()))?;
                    id = Some(generated);
                }
                IdGeneration::Identity => {}
                IdGeneration::None => {
                    return Err(log_error(OrmError::invalid_draft(format!(
                        "the id of the new `{}` must be assigned",
                        ty.name()
                    ))));
                }
            }
        }

        let old = match &id {
            Some(id) if !is_new && self.triggers().needs_old_rows(ty.key())? => self
                .rows_by_ids(executor, ty, std::slice::from_ref(id))
                .await?
                .pop(),
            _ => None,
        };

        let mut columns = Vec::new();
        for prop in ty.column_props() {
            let Some(value) = entity.get(prop.key()) else {
                continue;
            };
            if prop.is_id() && !is_new {
                continue;
            }
            let value = match value {
                PropValue::Scalar(v) => coerce(prop.prototype(), v.clone()).map_err(|e| {
                    log_error(OrmError::invalid_draft(format!(
                        "{}.{}: {e:#}",
                        ty.name(),
                        prop.name()
                    )))
                })?,
                PropValue::Reference(None) => prop.prototype().as_null(),
                PropValue::Reference(Some(target)) => target.id(schema)?,
                PropValue::List(..) => continue,
            };
            columns.push((prop.column_name().unwrap_or_default(), value));
        }

        let affected_rows = if is_new {
            let statement = self.statement(executor, |w, b| {
                w.write_insert(b, ty.table_name(), &columns)
            })?;
            let affected = self.execute(executor, statement).await?;
            expect_rows(1, affected.rows_affected, format!("insert into `{}`", ty.name()))?;
            if id.is_none() {
                let Some(generated) = affected.last_affected_id else {
                    return Err(log_error(OrmError::mapping(format!(
                        "the driver did not report the id generated for `{}`",
                        ty.name()
                    ))));
                };
                let generated = coerce(id_prop.prototype(), Value::Int64(Some(generated)))?;
                entity.set_slot(id_prop.key(), PropValue::Scalar(generated))?;
            }
            affected.rows_affected
        } else if columns.is_empty() {
            0
        } else {
            let id = id.clone().unwrap_or_default();
            let statement = self.statement(executor, |w, b| {
                w.write_update(
                    b,
                    ty.table_name(),
                    &columns,
                    id_prop.column_name().unwrap_or_default(),
                    &id,
                )
            })?;
            let affected = self.execute(executor, statement).await?;
            expect_rows(1, affected.rows_affected, format!("update of `{}` {id}", ty.name()))?;
            affected.rows_affected
        };
        let id = entity.id(schema)?;

        let mut events = vec![Event::Entity(EntityEvent {
            ty: ty.key(),
            id: id.clone(),
            old: old.clone(),
            new: Some(entity.clone()),
            reason: reason.map(Into::into),
        })];
        for prop in ty.props() {
            if !matches!(prop.kind(), PropKind::Reference) || !entity.is_loaded(prop.key()) {
                continue;
            }
            let old_target = match (&old, is_new) {
                (_, true) => None,
                (Some(old), false) if old.is_loaded(prop.key()) => {
                    reference_id(self, old.get(prop.key()))?
                }
                _ => continue,
            };
            let new_target = reference_id(self, entity.get(prop.key()))?;
            events.extend(reference_change_events(
                prop.key(),
                id.clone(),
                old_target,
                new_target,
                reason,
            ));
        }
        for prop in ty.props().iter().filter(|p| p.is_list()) {
            let Some(PropValue::List(targets)) = entity.get(prop.key()) else {
                continue;
            };
            let Ok(middle) = schema.middle_table(prop) else {
                log::warn!(
                    "`{}.{}` is a one-to-many list, it is not saved through its owner",
                    ty.name(),
                    prop.name()
                );
                continue;
            };
            let desired = targets
                .iter()
                .map(|v| v.id(schema))
                .collect::<Result<IndexSet<_>>>()?;
            self.sync_middle_table(
                executor,
                prop.key(),
                &middle,
                &id,
                desired,
                is_new,
                reason,
                &mut events,
            )
            .await?;
        }

        self.triggers().fire_all(events)?;
        Ok(SaveResult {
            entity,
            is_new,
            affected_rows,
        })
    }

    /// Deletes the removed pairs and inserts the added ones.
    #[allow(clippy::too_many_arguments)]
    async fn sync_middle_table<E: Executor>(
        &self,
        executor: &mut E,
        prop: crate::PropKey,
        middle: &MiddleTable,
        id: &Value,
        desired: IndexSet<Value>,
        is_new: bool,
        reason: Option<&str>,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        let existing = if is_new {
            IndexSet::new()
        } else {
            let statement = self.statement(executor, |w, b| {
                w.write_middle_select(b, middle, std::slice::from_ref(id))
            })?;
            self.fetch_rows(executor, statement)
                .await?
                .into_iter()
                .filter_map(|row| row.values.get(1).cloned())
                .collect::<IndexSet<_>>()
        };
        let removed = existing
            .iter()
            .filter(|v| !desired.contains(*v))
            .map(|v| (id.clone(), v.clone()))
            .collect::<Vec<_>>();
        let added = desired
            .iter()
            .filter(|v| !existing.contains(*v))
            .map(|v| (id.clone(), v.clone()))
            .collect::<Vec<_>>();
        if !removed.is_empty() {
            let statement =
                self.statement(executor, |w, b| w.write_middle_delete(b, middle, &removed))?;
            self.execute(executor, statement).await?;
            events.extend(removed.into_iter().map(|(source, target)| {
                association_event(prop, source, target, AssociationEventKind::Delete, reason)
            }));
        }
        if !added.is_empty() {
            let statement =
                self.statement(executor, |w, b| w.write_middle_insert(b, middle, &added))?;
            let affected = self.execute(executor, statement).await?;
            expect_rows(
                added.len() as u64,
                affected.rows_affected,
                format!("insert into `{}`", middle.table),
            )?;
            events.extend(added.into_iter().map(|(source, target)| {
                association_event(prop, source, target, AssociationEventKind::Insert, reason)
            }));
        }
        Ok(())
    }

    pub async fn delete_by_ids<E: Executor>(
        &self,
        executor: &mut E,
        ty: impl AsType,
        ids: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<u64> {
        self.delete_by_ids_with_reason(executor, ty, ids, None)
            .await
    }

    /// Deletes the middle table rows of the many-to-many props of the type, then the rows.
    ///
    /// Returns the number of rows deleted from the table of the type.
    pub async fn delete_by_ids_with_reason<E: Executor>(
        &self,
        executor: &mut E,
        ty: impl AsType,
        ids: impl IntoIterator<Item = impl Into<Value>>,
        reason: Option<&str>,
    ) -> Result<u64> {
        let schema = self.schema();
        let ty = ty.resolve_type(schema)?;
        if ty.is_mapped_superclass() {
            return Err(log_error(OrmError::invalid_path(format!(
                "cannot delete the mapped superclass `{}`",
                ty.name()
            ))));
        }
        let ids = ids
            .into_iter()
            .map(Into::into)
            .collect::<IndexSet<Value>>()
            .into_iter()
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(0);
        }
        let old = if self.triggers().needs_old_rows(ty.key())? {
            self.rows_by_ids(executor, ty, &ids).await?
        } else {
            Vec::new()
        };

        let mut middle_events = Vec::new();
        for prop in ty.props().iter().filter(|p| p.is_list()) {
            let Ok(middle) = schema.middle_table(prop) else {
                continue;
            };
            if self.triggers().has_association_listeners(prop.key())? {
                let statement = self.statement(executor, |w, b| {
                    w.write_middle_select(b, &middle, &ids)
                })?;
                for row in self.fetch_rows(executor, statement).await? {
                    let mut values = row.values.into_vec().into_iter();
                    let (Some(source), Some(target)) = (values.next(), values.next()) else {
                        return Err(log_error(OrmError::mapping(format!(
                            "`{}` rows must have two columns",
                            middle.table
                        ))));
                    };
                    middle_events.push(association_event(
                        prop.key(),
                        source,
                        target,
                        AssociationEventKind::Delete,
                        reason,
                    ));
                }
            }
            let statement = self.statement(executor, |w, b| {
                w.write_middle_delete_by_sources(b, &middle, &ids)
            })?;
            self.execute(executor, statement).await?;
        }

        let id_column = ty.id_prop()?.column_name().unwrap_or_default();
        let statement = self.statement(executor, |w, b| {
            w.write_delete(b, ty.table_name(), id_column, &ids)
        })?;
        let affected = self.execute(executor, statement).await?;

        // Entity events, then foreign key and middle table events
        let mut events = Vec::with_capacity(old.len() + middle_events.len());
        let mut references = Vec::new();
        for entity in old {
            let id = entity.id(schema)?;
            for prop in ty.props() {
                if matches!(prop.kind(), PropKind::Reference) {
                    references.extend(reference_change_events(
                        prop.key(),
                        id.clone(),
                        reference_id(self, entity.get(prop.key()))?,
                        None,
                        reason,
                    ));
                }
            }
            events.push(Event::Entity(EntityEvent {
                ty: ty.key(),
                id,
                old: Some(entity),
                new: None,
                reason: reason.map(Into::into),
            }));
        }
        events.extend(references);
        events.extend(middle_events);
        self.triggers().fire_all(events)?;
        Ok(affected.rows_affected)
    }

    async fn exists<E: Executor>(
        &self,
        executor: &mut E,
        ty: &ImmutableType,
        id: Value,
    ) -> Result<bool> {
        let mut query = self.query(ty.key())?;
        let root = query.root();
        query
            .select(lit_int(1))
            .filter(root.get(ty.id_prop()?.key()).eq(id));
        Ok(!query.fetch::<Value, E>(executor).await?.is_empty())
    }

    /// Id of the row whose key props equal the loaded ones of `entity`.
    async fn id_by_key<E: Executor>(
        &self,
        executor: &mut E,
        ty: &ImmutableType,
        entity: &Entity,
    ) -> Result<Option<Value>> {
        let mut keys = Vec::new();
        for prop in ty.key_props() {
            match entity.scalar(prop.key()) {
                Some(value) => keys.push((prop.key(), value.clone())),
                None => return Ok(None),
            }
        }
        if keys.is_empty() {
            return Ok(None);
        }
        let mut query = self.query(ty.key())?;
        let root = query.root();
        query.select(root.get(ty.id_prop()?.key()));
        for (prop, value) in keys {
            query.filter(root.get(prop).eq(value));
        }
        let mut ids = query.fetch::<Value, E>(executor).await?;
        if ids.len() > 1 {
            return Err(log_error(
                OrmError::UnexpectedRowCount {
                    expected: 1,
                    actual: ids.len() as u64,
                }
                .into(),
            ));
        }
        Ok(ids.pop())
    }

    async fn rows_by_ids<E: Executor>(
        &self,
        executor: &mut E,
        ty: &ImmutableType,
        ids: &[Value],
    ) -> Result<Vec<Entity>> {
        let mut query = self.query(ty.key())?;
        let root = query.root();
        query.filter(root.get(ty.id_prop()?.key()).in_list(ids.iter().cloned()));
        query.fetch::<Entity, E>(executor).await
    }
}
