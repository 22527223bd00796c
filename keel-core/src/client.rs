use crate::{
    AsProp, AsType, AssociationCache, AssociationCommands, CacheFactory, Driver, DraftInterceptor,
    Entity, Executor, Fetcher, ListLoader, ObjectCache, PropKey, ReferenceLoader, Result,
    RowLabeled, RowsAffected, Schema, SelectQuery, Triggers, TypeKey, Value,
    stream::TryStreamExt,
    writer::{SqlBuilder, SqlWriter, Statement},
};
use indexmap::IndexSet;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Most sources loaded by one association statement.
    pub batch_size: usize,
    /// Whether every statement is written to the debug log.
    pub log_statements: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 128,
            log_statements: true,
        }
    }
}

pub struct ClientBuilder {
    schema: Arc<Schema>,
    interceptors: Vec<Arc<dyn DraftInterceptor>>,
    cache_factory: Option<Arc<dyn CacheFactory>>,
    config: Config,
}

impl ClientBuilder {
    pub fn interceptor(mut self, interceptor: impl DraftInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn cache_factory(mut self, factory: impl CacheFactory + 'static) -> Self {
        self.cache_factory = Some(Arc::new(factory));
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Resolves the interceptor types, creates the caches and registers their invalidation
    /// listeners.
    pub fn build(self) -> Result<SqlClient> {
        let schema = self.schema;
        let triggers = Triggers::new(schema.clone());
        let interceptors = self
            .interceptors
            .into_iter()
            .map(|v| Ok((schema.find_type(v.type_name())?.key(), v)))
            .collect::<Result<Vec<_>>>()?;
        let mut object_caches = HashMap::new();
        let mut association_caches = HashMap::new();
        if let Some(factory) = &self.cache_factory {
            for ty in schema.types().iter().filter(|t| !t.is_mapped_superclass()) {
                if let Some(cache) = factory.create_object_cache(ty) {
                    let evicted = cache.clone();
                    triggers.add_entity_listener(ty.key(), move |e| {
                        evicted.delete(&e.id, e.reason.as_deref())
                    })?;
                    object_caches.insert(ty.key(), cache);
                }
                for prop in ty.props().iter().filter(|p| p.is_list()) {
                    if let Some(cache) = factory.create_association_cache(prop) {
                        let evicted = cache.clone();
                        triggers.add_association_listener(ty.key(), prop.key(), move |e| {
                            evicted.delete(&e.source_id, e.reason.as_deref())
                        })?;
                        association_caches.insert(prop.key(), cache);
                    }
                }
            }
        }
        log::debug!(
            "Client built with {} interceptor(s), {} object cache(s), {} association cache(s)",
            interceptors.len(),
            object_caches.len(),
            association_caches.len()
        );
        Ok(SqlClient {
            schema,
            triggers,
            interceptors,
            object_caches,
            association_caches,
            config: self.config,
        })
    }
}

/// Entry point of the engine: queries, saves, deletes and association loading over any
/// [`Executor`].
pub struct SqlClient {
    schema: Arc<Schema>,
    triggers: Triggers,
    interceptors: Vec<(TypeKey, Arc<dyn DraftInterceptor>)>,
    object_caches: HashMap<TypeKey, ObjectCache>,
    association_caches: HashMap<PropKey, AssociationCache>,
    config: Config,
}

impl SqlClient {
    pub fn builder(schema: Arc<Schema>) -> ClientBuilder {
        ClientBuilder {
            schema,
            interceptors: Vec::new(),
            cache_factory: None,
            config: Config::default(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn triggers(&self) -> &Triggers {
        &self.triggers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn object_cache(&self, ty: TypeKey) -> Option<&ObjectCache> {
        self.object_caches.get(&ty)
    }

    pub fn association_cache(&self, prop: PropKey) -> Option<&AssociationCache> {
        self.association_caches.get(&prop)
    }

    /// Interceptors registered for `ty` or one of its super types, in registration order.
    pub(crate) fn interceptors_of(
        &self,
        ty: TypeKey,
    ) -> impl Iterator<Item = &Arc<dyn DraftInterceptor>> {
        self.interceptors
            .iter()
            .filter(move |(t, _)| self.schema.is_assignable(ty, *t))
            .map(|(_, v)| v)
    }

    pub fn query(&self, ty: impl AsType) -> Result<SelectQuery<'_>> {
        let mut query = SelectQuery::new(&self.schema, ty)?;
        query.log_statements(self.config.log_statements);
        Ok(query)
    }

    /// Fetcher of the id of `ty`, see [`Fetcher::add`].
    pub fn fetcher(&self, ty: impl AsType) -> Result<Fetcher<'_>> {
        Fetcher::new(self, ty)
    }

    pub fn list_loader(&self, ty: impl AsType, prop: impl AsProp) -> Result<ListLoader<'_>> {
        ListLoader::new(self, ty, prop)
    }

    pub fn reference_loader(
        &self,
        ty: impl AsType,
        prop: impl AsProp,
    ) -> Result<ReferenceLoader<'_>> {
        ReferenceLoader::new(self, ty, prop)
    }

    /// Direct commands over the middle table of a many-to-many prop.
    pub fn associations(
        &self,
        ty: impl AsType,
        prop: impl AsProp,
    ) -> Result<AssociationCommands<'_>> {
        AssociationCommands::new(self, ty, prop)
    }

    /// Entities in the order of `ids`, the missing ones are skipped.
    ///
    /// The object cache of the type is consulted first, the misses are loaded with one
    /// statement and put in the cache.
    pub async fn find_by_ids<E: Executor>(
        &self,
        executor: &mut E,
        ty: impl AsType,
        ids: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<Vec<Entity>> {
        let ty = ty.resolve_type(&self.schema)?;
        let ids = ids
            .into_iter()
            .map(Into::into)
            .collect::<IndexSet<Value>>()
            .into_iter()
            .collect::<Vec<_>>();
        let cache = self.object_cache(ty.key());
        let mut found = match cache {
            Some(cache) => cache.get_all(&ids)?,
            None => HashMap::new(),
        };
        let missing = ids
            .iter()
            .filter(|id| !found.contains_key(*id))
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            let mut query = self.query(ty.key())?;
            let root = query.root();
            query.filter(root.get(ty.id_prop()?.key()).in_list(missing));
            let mut loaded = HashMap::new();
            for entity in query.fetch::<Entity, E>(executor).await? {
                loaded.insert(entity.id(&self.schema)?, entity);
            }
            if let Some(cache) = cache {
                cache.put_all(loaded.clone())?;
            }
            found.extend(loaded);
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    pub async fn find_by_id<E: Executor>(
        &self,
        executor: &mut E,
        ty: impl AsType,
        id: impl Into<Value>,
    ) -> Result<Option<Entity>> {
        let id: Value = id.into();
        Ok(self
            .find_by_ids(executor, ty, [id])
            .await?
            .into_iter()
            .next())
    }

    /// Statement built with the dialect of `executor`.
    pub(crate) fn statement<E: Executor>(
        &self,
        executor: &E,
        f: impl FnOnce(&dyn SqlWriter, &mut SqlBuilder<'_>) -> Result<()>,
    ) -> Result<Statement> {
        let writer = executor.driver().sql_writer();
        let writer = writer.as_dyn();
        let mut builder = SqlBuilder::new(writer, &self.schema);
        f(writer, &mut builder)?;
        Ok(builder.finish())
    }

    fn log(&self, statement: &Statement) {
        if self.config.log_statements {
            log::debug!("{statement}\n{:?}", statement.variables);
        }
    }

    pub(crate) async fn execute<E: Executor>(
        &self,
        executor: &mut E,
        statement: Statement,
    ) -> Result<RowsAffected> {
        self.log(&statement);
        executor.execute(statement).await
    }

    pub(crate) async fn fetch_rows<E: Executor>(
        &self,
        executor: &mut E,
        statement: Statement,
    ) -> Result<Vec<RowLabeled>> {
        self.log(&statement);
        executor.fetch(statement).try_collect().await
    }
}
