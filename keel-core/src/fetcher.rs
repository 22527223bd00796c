use crate::{
    AsProp, AsType, Entity, Executor, ImmutableProp, ImmutableType, OrmError, PropKey, PropValue,
    Result, SqlClient, TypeKey,
};

/// Shape of the entities returned by [`crate::SelectQuery::fetch_by`].
///
/// Column props are read by the statement of the query, associations are filled afterwards with
/// one batched load per association and per level, whatever the number of fetched rows.
///
/// ```ignore
/// let fetcher = client
///     .fetcher("Book")?
///     .add("name")?
///     .add_with("authors", client.fetcher("Author")?.add("firstName")?)?;
/// let books = query.fetch_by(&mut executor, &fetcher).await?;
/// ```
#[derive(Clone)]
pub struct Fetcher<'c> {
    client: &'c SqlClient,
    ty: &'c ImmutableType,
    /// Id first.
    columns: Vec<PropKey>,
    associations: Vec<(&'c ImmutableProp, Fetcher<'c>)>,
}

impl<'c> Fetcher<'c> {
    /// Fetcher of the id alone.
    pub(crate) fn new(client: &'c SqlClient, ty: impl AsType) -> Result<Self> {
        let ty = ty.resolve_type(client.schema())?;
        if ty.is_mapped_superclass() {
            return Err(OrmError::invalid_path(format!(
                "cannot fetch the mapped superclass `{}`",
                ty.name()
            )));
        }
        Ok(Self {
            client,
            ty,
            columns: vec![ty.id_prop()?.key()],
            associations: Vec::new(),
        })
    }

    pub fn type_key(&self) -> TypeKey {
        self.ty.key()
    }

    /// Props read from the row, id first.
    pub fn columns(&self) -> &[PropKey] {
        &self.columns
    }

    /// Every prop stored in the row, references as id only targets.
    pub fn all_columns(mut self) -> Self {
        for prop in self.ty.column_props() {
            if !self.columns.contains(&prop.key()) {
                self.columns.push(prop.key());
            }
        }
        self
    }

    /// Column props are selected, other associations are loaded with id only targets.
    pub fn add(mut self, prop: impl AsProp) -> Result<Self> {
        let prop = prop.resolve_prop(self.client.schema(), self.ty)?;
        if prop.is_column() {
            if !self.columns.contains(&prop.key()) {
                self.columns.push(prop.key());
            }
            return Ok(self);
        }
        let child = Fetcher::new(self.client, target_type(self.ty, prop)?)?;
        self.set_association(prop, child);
        Ok(self)
    }

    /// Association whose targets are shaped by `child`.
    pub fn add_with(mut self, prop: impl AsProp, child: Fetcher<'c>) -> Result<Self> {
        let prop = prop.resolve_prop(self.client.schema(), self.ty)?;
        let target = target_type(self.ty, prop)?;
        if child.ty.key() != target {
            return Err(OrmError::invalid_path(format!(
                "`{}.{}` targets `{}`, not `{}`",
                self.ty.name(),
                prop.name(),
                self.client.schema().ty(target)?.name(),
                child.ty.name()
            )));
        }
        self.set_association(prop, child);
        Ok(self)
    }

    fn set_association(&mut self, prop: &'c ImmutableProp, child: Fetcher<'c>) {
        self.columns.retain(|v| *v != prop.key());
        match self
            .associations
            .iter_mut()
            .find(|(p, _)| p.key() == prop.key())
        {
            Some(existing) => existing.1 = child,
            None => self.associations.push((prop, child)),
        }
    }

    /// Copy of `entity` with only the props of this fetcher.
    fn shape(&self, entity: &Entity) -> Result<Entity> {
        let mut shaped = Entity::new(self.ty);
        for key in &self.columns {
            if let Some(value) = entity.get(*key) {
                shaped.set_slot(*key, value.clone())?;
            }
        }
        Ok(shaped)
    }

    /// Loads the associations of `entities`, which are entities of this fetcher's type.
    pub(crate) async fn fill<E: Executor>(
        &self,
        executor: &mut E,
        entities: &mut [Entity],
    ) -> Result<()> {
        if self.associations.is_empty() || entities.is_empty() {
            return Ok(());
        }
        let schema = self.client.schema();
        let ids = entities
            .iter()
            .map(|v| v.id(schema))
            .collect::<Result<Vec<_>>>()?;
        for (prop, child) in &self.associations {
            if prop.is_list() {
                let loaded = self
                    .client
                    .list_loader(self.ty, prop.key())?
                    .batch_load(executor, ids.iter().cloned())
                    .await?;
                let mut counts = Vec::with_capacity(ids.len());
                let mut targets = Vec::new();
                for id in &ids {
                    let list = loaded.get(id).map(Vec::as_slice).unwrap_or_default();
                    counts.push(list.len());
                    for target in list {
                        targets.push(child.shape(target)?);
                    }
                }
                Box::pin(child.fill(executor, &mut targets)).await?;
                let mut targets = targets.into_iter();
                for (entity, count) in entities.iter_mut().zip(counts) {
                    let list = targets.by_ref().take(count).collect();
                    entity.set_slot(prop.key(), PropValue::List(list))?;
                }
            } else {
                let loaded = self
                    .client
                    .reference_loader(self.ty, prop.key())?
                    .batch_load(executor, ids.iter().cloned())
                    .await?;
                let mut present = Vec::with_capacity(ids.len());
                let mut targets = Vec::new();
                for id in &ids {
                    match loaded.get(id).and_then(Option::as_ref) {
                        Some(target) => {
                            present.push(true);
                            targets.push(child.shape(target)?);
                        }
                        None => present.push(false),
                    }
                }
                Box::pin(child.fill(executor, &mut targets)).await?;
                let mut targets = targets.into_iter();
                for (entity, present) in entities.iter_mut().zip(present) {
                    let target = if present { targets.next() } else { None };
                    entity.set_slot(prop.key(), PropValue::reference(target))?;
                }
            }
        }
        Ok(())
    }
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

impl std::fmt::Debug for Fetcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schema = self.client.schema();
        write!(f, "{} ", self.ty.name())?;
        let mut list = f.debug_list();
        for key in &self.columns {
            match schema.prop(*key) {
                Ok(prop) => list.entry(&prop.name()),
                Err(..) => list.entry(key),
            };
        }
        for (prop, child) in &self.associations {
            list.entry(&format_args!("{}: {child:?}", prop.name()));
        }
        list.finish()
    }
}
