use crate::{
    AsProp, AsType, Entity, Executor, FromRow, ImmutableProp, ImmutableType, OrmError, PropKind,
    Result, SelectQuery, SqlClient, Table, TypeKey, Value,
};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

/// Extra conditions or ordering applied to the statement of a loader, the table handle is the
/// target of the association.
pub type LoaderFilter<'c> = Box<dyn Fn(&mut SelectQuery<'_>, Table) -> Result<()> + Send + Sync + 'c>;

/// Loads a list association of many sources at once.
///
/// Sources are split in batches of at most [`crate::Config::batch_size`], each batch is one
/// statement selecting the source id next to every column of the target.
pub struct ListLoader<'c> {
    client: &'c SqlClient,
    source: &'c ImmutableType,
    prop: &'c ImmutableProp,
    filter: Option<LoaderFilter<'c>>,
}

impl<'c> ListLoader<'c> {
    pub(crate) fn new(client: &'c SqlClient, ty: impl AsType, prop: impl AsProp) -> Result<Self> {
        let source = ty.resolve_type(client.schema())?;
        let prop = prop.resolve_prop(client.schema(), source)?;
        if !prop.is_list() {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` is not a list association",
                source.name(),
                prop.name()
            )));
        }
        Ok(Self {
            client,
            source,
            prop,
            filter: None,
        })
    }

    /// Filtered loads bypass the association cache.
    pub fn filter(
        mut self,
        filter: impl Fn(&mut SelectQuery<'_>, Table) -> Result<()> + Send + Sync + 'c,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub async fn load<E: Executor>(
        &self,
        executor: &mut E,
        source_id: impl Into<Value>,
    ) -> Result<Vec<Entity>> {
        let source_id: Value = source_id.into();
        Ok(self
            .batch_load(executor, [source_id.clone()])
            .await?
            .shift_remove(&source_id)
            .unwrap_or_default())
    }

    /// Targets of every source, sources in input order and targets in row order.
    pub async fn batch_load<E: Executor>(
        &self,
        executor: &mut E,
        source_ids: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<IndexMap<Value, Vec<Entity>>> {
        let ids = distinct(source_ids);
        let mut result = ids
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect::<IndexMap<_, _>>();
        let cache = match self.filter {
            None => self.client.association_cache(self.prop.key()),
            Some(..) => None,
        };
        let mut missing = ids;
        if let Some(cache) = cache {
            let hits = cache.get_all(&missing)?;
            if !hits.is_empty() {
                let target_ty = target_type(self.source, self.prop)?;
                let targets = self
                    .client
                    .find_by_ids(executor, target_ty, hits.values().flatten().cloned())
                    .await?
                    .into_iter()
                    .map(|e| Ok((e.id(self.client.schema())?, e)))
                    .collect::<Result<HashMap<_, _>>>()?;
                for (source, target_ids) in &hits {
                    if let Some(list) = result.get_mut(source) {
                        list.extend(target_ids.iter().filter_map(|id| targets.get(id).cloned()));
                    }
                }
                missing.retain(|id| !hits.contains_key(id));
                if missing.is_empty() {
                    return Ok(result);
                }
            }
        }
        let rows = load_batches::<(Value, Entity), E>(
            self.client,
            executor,
            self.source,
            self.prop,
            &missing,
            self.filter.as_ref(),
        )
        .await?;
        let mut loaded = HashMap::<Value, Vec<Value>>::new();
        for (source, target) in rows {
            if cache.is_some() {
                loaded
                    .entry(source.clone())
                    .or_default()
                    .push(target.id(self.client.schema())?);
            }
            if let Some(list) = result.get_mut(&source) {
                list.push(target);
            }
        }
        if let Some(cache) = cache {
            for id in &missing {
                loaded.entry(id.clone()).or_default();
            }
            cache.put_all(loaded)?;
        }
        Ok(result)
    }
}

/// Loads a reference (or one-to-one inverse) association of many sources at once.
pub struct ReferenceLoader<'c> {
    client: &'c SqlClient,
    source: &'c ImmutableType,
    prop: &'c ImmutableProp,
    filter: Option<LoaderFilter<'c>>,
}

impl<'c> ReferenceLoader<'c> {
    pub(crate) fn new(client: &'c SqlClient, ty: impl AsType, prop: impl AsProp) -> Result<Self> {
        let source = ty.resolve_type(client.schema())?;
        let prop = prop.resolve_prop(client.schema(), source)?;
        if !prop.is_reference() {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` is not a reference association",
                source.name(),
                prop.name()
            )));
        }
        Ok(Self {
            client,
            source,
            prop,
            filter: None,
        })
    }

    /// A filter could hide the target of a non null reference, so it is rejected there.
    pub fn filter(
        mut self,
        filter: impl Fn(&mut SelectQuery<'_>, Table) -> Result<()> + Send + Sync + 'c,
    ) -> Result<Self> {
        if !self.prop.is_nullable() {
            return Err(OrmError::unsupported(format!(
                "cannot filter the non null reference `{}.{}`",
                self.source.name(),
                self.prop.name()
            )));
        }
        self.filter = Some(Box::new(filter));
        Ok(self)
    }

    pub async fn load<E: Executor>(
        &self,
        executor: &mut E,
        source_id: impl Into<Value>,
    ) -> Result<Option<Entity>> {
        let source_id: Value = source_id.into();
        Ok(self
            .batch_load(executor, [source_id.clone()])
            .await?
            .shift_remove(&source_id)
            .flatten())
    }

    /// Target of every source, `None` when the reference is null or filtered out.
    pub async fn batch_load<E: Executor>(
        &self,
        executor: &mut E,
        source_ids: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<IndexMap<Value, Option<Entity>>> {
        let ids = distinct(source_ids);
        let rows = load_batches::<(Value, Option<Entity>), E>(
            self.client,
            executor,
            self.source,
            self.prop,
            &ids,
            self.filter.as_ref(),
        )
        .await?;
        let mut result = ids
            .into_iter()
            .map(|id| (id, None))
            .collect::<IndexMap<_, _>>();
        for (source, target) in rows {
            if let Some(slot) = result.get_mut(&source) {
                if slot.is_none() {
                    *slot = target;
                }
            }
        }
        Ok(result)
    }
}

fn distinct(ids: impl IntoIterator<Item = impl Into<Value>>) -> Vec<Value> {
    ids.into_iter()
        .map(Into::into)
        .collect::<IndexSet<Value>>()
        .into_iter()
        .collect()
}

fn target_type(source: &ImmutableType, prop: &ImmutableProp) -> Result<TypeKey> {
    prop.target_type().ok_or_else(|| {
        OrmError::invalid_path(format!(
            "`{}.{}` is not an association",
            source.name(),
            prop.name()
        ))
    })
}

/// One statement per batch, an empty source list still issues one statement.
async fn load_batches<T: FromRow, E: Executor>(
    client: &SqlClient,
    executor: &mut E,
    source: &ImmutableType,
    prop: &ImmutableProp,
    ids: &[Value],
    filter: Option<&LoaderFilter<'_>>,
) -> Result<Vec<T>> {
    let batch_size = client.config().batch_size.max(1);
    if ids.len() > batch_size {
        log::warn!(
            "Loading `{}.{}` for {} sources, split into {} statements of at most {batch_size}",
            source.name(),
            prop.name(),
            ids.len(),
            ids.len().div_ceil(batch_size)
        );
    }
    let batches = if ids.is_empty() {
        vec![ids]
    } else {
        ids.chunks(batch_size).collect()
    };
    let mut rows = Vec::new();
    for batch in batches {
        let query = association_query(client, source, prop, batch, filter)?;
        rows.extend(query.fetch::<T, E>(executor).await?);
    }
    Ok(rows)
}

/// `select source.ID, target.* ... where source.ID in (...)`
///
/// The source table is reached from the target whenever the association allows it, so that it
/// stays phantom and its id is read from the foreign key or the middle table.
fn association_query<'c>(
    client: &'c SqlClient,
    source: &ImmutableType,
    prop: &ImmutableProp,
    ids: &[Value],
    filter: Option<&LoaderFilter<'_>>,
) -> Result<SelectQuery<'c>> {
    let target_ty = target_type(source, prop)?;
    let source_id = source.id_prop()?.key();
    let (mut query, source_table, target_table) = match prop.kind() {
        PropKind::Reference => {
            let mut query = client.query(source.key())?;
            let root = query.root();
            let target = if prop.is_nullable() {
                query.outer_join(root, prop.key())?
            } else {
                query.join(root, prop.key())?
            };
            (query, root, target)
        }
        PropKind::ManyToMany(..) => {
            let mut query = client.query(target_ty)?;
            let root = query.root();
            let source = query.inverse_join(root, source.key(), prop.key())?;
            (query, source, root)
        }
        PropKind::Inverse { mapped_by, .. } => {
            let mut query = client.query(target_ty)?;
            let root = query.root();
            let source = query.join(root, *mapped_by)?;
            (query, source, root)
        }
        _ => {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` is not an association",
                source.name(),
                prop.name()
            )));
        }
    };
    query
        .select(source_table.get(source_id))
        .select_entity(target_table)
        .filter(source_table.get(source_id).in_list(ids.iter().cloned()));
    if let Some(filter) = filter {
        filter(&mut query, target_table)?;
    }
    Ok(query)
}
