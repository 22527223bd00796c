use crate::{
    AsProp, AsType, AssociationEventKind, Executor, ImmutableProp, ImmutableType, MiddleTable,
    Result, SqlClient, Value,
    save::{expect_rows, log_error},
    trigger::association_event,
};
use indexmap::IndexSet;
use std::collections::HashSet;

/// Inserts and deletes rows of the middle table of a many-to-many prop without loading either
/// side.
///
/// Every pair is `(source id, target id)` seen from the prop the commands were created for, the
/// triggers receive the events of both sides.
pub struct AssociationCommands<'c> {
    client: &'c SqlClient,
    ty: &'c ImmutableType,
    prop: &'c ImmutableProp,
    middle: MiddleTable,
    reason: Option<String>,
}

impl<'c> AssociationCommands<'c> {
    pub(crate) fn new(client: &'c SqlClient, ty: impl AsType, prop: impl AsProp) -> Result<Self> {
        let ty = ty.resolve_type(client.schema())?;
        let prop = prop.resolve_prop(client.schema(), ty)?;
        let middle = client.schema().middle_table(prop)?;
        Ok(Self {
            client,
            ty,
            prop,
            middle,
            reason: None,
        })
    }

    /// Token handed to the listeners of the events.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn middle_table(&self) -> &MiddleTable {
        &self.middle
    }

    pub async fn insert<E: Executor>(
        &self,
        executor: &mut E,
        pairs: impl IntoIterator<Item = (impl Into<Value>, impl Into<Value>)>,
    ) -> Result<u64> {
        let pairs = distinct_pairs(pairs);
        self.insert_pairs(executor, pairs).await
    }

    /// Like [`AssociationCommands::insert`], the pairs already present are skipped.
    pub async fn check_and_insert<E: Executor>(
        &self,
        executor: &mut E,
        pairs: impl IntoIterator<Item = (impl Into<Value>, impl Into<Value>)>,
    ) -> Result<u64> {
        let mut pairs = distinct_pairs(pairs);
        if pairs.is_empty() {
            return Ok(0);
        }
        let statement = self.client.statement(executor, |w, b| {
            w.write_middle_select_pairs(b, &self.middle, &pairs)
        })?;
        let existing = self
            .client
            .fetch_rows(executor, statement)
            .await?
            .into_iter()
            .filter_map(|row| {
                let mut values = row.values.into_vec().into_iter();
                Some((values.next()?, values.next()?))
            })
            .collect::<HashSet<_>>();
        if !existing.is_empty() {
            log::debug!(
                "{} pair(s) of `{}.{}` already exist",
                existing.len(),
                self.ty.name(),
                self.prop.name()
            );
        }
        pairs.retain(|pair| !existing.contains(pair));
        self.insert_pairs(executor, pairs).await
    }

    pub async fn delete<E: Executor>(
        &self,
        executor: &mut E,
        pairs: impl IntoIterator<Item = (impl Into<Value>, impl Into<Value>)>,
    ) -> Result<u64> {
        let pairs = distinct_pairs(pairs);
        if pairs.is_empty() {
            return Ok(0);
        }
        let statement = self.client.statement(executor, |w, b| {
            w.write_middle_delete(b, &self.middle, &pairs)
        })?;
        let affected = self.client.execute(executor, statement).await?;
        self.fire(pairs, AssociationEventKind::Delete)?;
        Ok(affected.rows_affected)
    }

    async fn insert_pairs<E: Executor>(
        &self,
        executor: &mut E,
        pairs: Vec<(Value, Value)>,
    ) -> Result<u64> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let statement = self.client.statement(executor, |w, b| {
            w.write_middle_insert(b, &self.middle, &pairs)
        })?;
        let affected = self.client.execute(executor, statement).await?;
        expect_rows(
            pairs.len() as u64,
            affected.rows_affected,
            format!("insert into `{}`", self.middle.table),
        )?;
        self.fire(pairs, AssociationEventKind::Insert)?;
        Ok(affected.rows_affected)
    }

    fn fire(&self, pairs: Vec<(Value, Value)>, kind: AssociationEventKind) -> Result<()> {
        let events = pairs
            .into_iter()
            .map(|(source, target)| {
                association_event(self.prop.key(), source, target, kind, self.reason.as_deref())
            })
            .collect();
        self.client.triggers().fire_all(events).map_err(log_error)
    }
}

fn distinct_pairs(
    pairs: impl IntoIterator<Item = (impl Into<Value>, impl Into<Value>)>,
) -> Vec<(Value, Value)> {
    pairs
        .into_iter()
        .map(|(s, t)| (s.into(), t.into()))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}
