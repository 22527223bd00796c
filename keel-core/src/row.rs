use crate::{
    AsValue, Entity, OrmError, PropKey, PropKind, PropValue, Projection, Result, Schema, TypeKey,
    Value, draft::coerce,
};
use rust_decimal::Decimal;
use std::{sync::Arc, vec};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

pub type RowNames = Arc<[String]>;
pub type Row = Box<[Value]>;

/// Row returned by the executor, with the column labels.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(names: RowNames, values: Row) -> Self {
        Self {
            labels: names,
            values,
        }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
}

/// Outcome of a write statement.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    pub rows_affected: u64,
    /// Id generated by the database for the last inserted row, when the driver reports it.
    pub last_affected_id: Option<i64>,
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            if elem.last_affected_id.is_some() {
                self.last_affected_id = elem.last_affected_id;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Row(RowLabeled),
    Affected(RowsAffected),
}

/// Value produced by one projection of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Value(Value),
    /// `None` when every column of an outer joined table is null.
    Entity(Option<Entity>),
}

#[derive(Debug, Clone, PartialEq)]
enum LayoutItem {
    Value,
    Entity { ty: TypeKey, props: Vec<PropKey> },
}

/// How the columns of a row map back to the projections of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    items: Vec<LayoutItem>,
}

impl RowLayout {
    pub fn new(schema: &Schema, projections: &[Projection]) -> Result<Self> {
        let items = projections
            .iter()
            .map(|projection| {
                Ok(match projection {
                    Projection::Expression(..) => LayoutItem::Value,
                    Projection::Entity(table) => {
                        let ty = schema.ty(table.type_key())?;
                        LayoutItem::Entity {
                            ty: ty.key(),
                            props: ty.column_props().map(|p| p.key()).collect(),
                        }
                    }
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { items })
    }

    /// Number of columns a row must have.
    pub fn width(&self) -> usize {
        self.items
            .iter()
            .map(|v| match v {
                LayoutItem::Value => 1,
                LayoutItem::Entity { props, .. } => props.len(),
            })
            .sum()
    }

    pub fn decode(&self, schema: &Schema, row: Row) -> Result<Vec<Fetched>> {
        if row.len() != self.width() {
            return Err(OrmError::mapping(format!(
                "expected {} columns, the row has {}",
                self.width(),
                row.len()
            )));
        }
        let mut values = row.into_vec().into_iter();
        let mut result = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match item {
                LayoutItem::Value => {
                    result.push(Fetched::Value(values.next().unwrap_or_default()));
                }
                LayoutItem::Entity { ty, props } => {
                    let columns = values.by_ref().take(props.len()).collect::<Vec<_>>();
                    result.push(Fetched::Entity(decode_entity(schema, *ty, props, columns)?));
                }
            }
        }
        Ok(result)
    }
}

pub(crate) fn decode_entity(
    schema: &Schema,
    ty: TypeKey,
    props: &[PropKey],
    columns: Vec<Value>,
) -> Result<Option<Entity>> {
    let ty = schema.ty(ty)?;
    // Id comes first, a null id is an outer join without match
    if columns.first().is_none_or(Value::is_null) {
        return Ok(None);
    }
    let mut entity = Entity::new(ty);
    for (key, value) in props.iter().zip(columns) {
        let prop = schema.prop(*key)?;
        let slot = match prop.kind() {
            PropKind::Reference => {
                let target = schema.ty(prop.target_type().ok_or_else(|| {
                    OrmError::mapping(format!("`{}` has no target type", prop.name()))
                })?)?;
                if value.is_null() {
                    PropValue::Reference(None)
                } else {
                    let id = coerce(target.id_prop()?.prototype(), value)
                        .map_err(|e| OrmError::mapping(format!("{}.{}: {e:#}", ty.name(), prop.name())))?;
                    PropValue::reference(Some(Entity::id_only(target, id)?))
                }
            }
            _ => PropValue::Scalar(
                coerce(prop.prototype(), value)
                    .map_err(|e| OrmError::mapping(format!("{}.{}: {e:#}", ty.name(), prop.name())))?,
            ),
        };
        entity.set_slot(*key, slot)?;
    }
    Ok(Some(entity))
}

/// Conversion of the fetched projections of one row into a Rust value.
///
/// Scalars take one projection, entities one [`Fetched::Entity`] and tuples consume their
/// members left to right.
pub trait FromRow: Sized {
    fn from_fetched(items: &mut vec::IntoIter<Fetched>) -> Result<Self>;

    /// Decodes the whole row, every projection must be consumed.
    fn from_row(items: Vec<Fetched>) -> Result<Self> {
        let len = items.len();
        let mut items = items.into_iter();
        let result = Self::from_fetched(&mut items)?;
        if items.len() > 0 {
            return Err(OrmError::mapping(format!(
                "the row has {len} values, {} were left unread",
                items.len()
            )));
        }
        Ok(result)
    }
}

fn next_value(items: &mut vec::IntoIter<Fetched>) -> Result<Value> {
    match items.next() {
        Some(Fetched::Value(v)) => Ok(v),
        Some(Fetched::Entity(..)) => Err(OrmError::mapping("an entity cannot be read as a value")),
        None => Err(OrmError::mapping("the row has fewer values than requested")),
    }
}

fn next_entity(items: &mut vec::IntoIter<Fetched>) -> Result<Option<Entity>> {
    match items.next() {
        Some(Fetched::Entity(v)) => Ok(v),
        Some(Fetched::Value(..)) => Err(OrmError::mapping("a value cannot be read as an entity")),
        None => Err(OrmError::mapping("the row has fewer values than requested")),
    }
}

impl FromRow for Value {
    fn from_fetched(items: &mut vec::IntoIter<Fetched>) -> Result<Self> {
        next_value(items)
    }
}

impl FromRow for Entity {
    fn from_fetched(items: &mut vec::IntoIter<Fetched>) -> Result<Self> {
        next_entity(items)?
            .ok_or_else(|| OrmError::mapping("null entity, read it as `Option<Entity>`"))
    }
}

impl FromRow for Option<Entity> {
    fn from_fetched(items: &mut vec::IntoIter<Fetched>) -> Result<Self> {
        next_entity(items)
    }
}

macro_rules! impl_from_row_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromRow for $ty {
                fn from_fetched(items: &mut vec::IntoIter<Fetched>) -> Result<Self> {
                    <$ty as AsValue>::try_from_value(next_value(items)?)
                        .map_err(|e| OrmError::mapping(format!("{e:#}")))
                }
            }
            impl FromRow for Option<$ty> {
                fn from_fetched(items: &mut vec::IntoIter<Fetched>) -> Result<Self> {
                    <Option<$ty> as AsValue>::try_from_value(next_value(items)?)
                        .map_err(|e| OrmError::mapping(format!("{e:#}")))
                }
            }
        )+
    };
}

impl_from_row_value!(
    bool,
    i8,
    i16,
    i32,
    i64,
    f32,
    f64,
    Decimal,
    String,
    Box<[u8]>,
    Date,
    Time,
    PrimitiveDateTime,
    OffsetDateTime,
    Uuid,
);

macro_rules! impl_from_row_tuple {
    ($($name:ident),+) => {
        impl<$($name: FromRow),+> FromRow for ($($name,)+) {
            fn from_fetched(items: &mut vec::IntoIter<Fetched>) -> Result<Self> {
                Ok(($($name::from_fetched(items)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(A);
impl_from_row_tuple!(A, B);
impl_from_row_tuple!(A, B, C);
impl_from_row_tuple!(A, B, C, D);
impl_from_row_tuple!(A, B, C, D, E);
impl_from_row_tuple!(A, B, C, D, E, F);
impl_from_row_tuple!(A, B, C, D, E, F, G);
impl_from_row_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdGeneration, TableGraph, TypeBuilder};

    fn schema() -> Schema {
        Schema::builder()
            .add(
                TypeBuilder::entity("Store")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .scalar("name", Value::Varchar(None)),
            )
            .add(
                TypeBuilder::entity("Book")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .scalar("name", Value::Varchar(None))
                    .reference("store", "Store")
                    .nullable(),
            )
            .build()
            .expect("valid schema")
    }

    fn layout(schema: &Schema) -> RowLayout {
        let mut graph = TableGraph::new();
        let book = graph.add_root(schema, "Book", None).unwrap();
        let store = graph.outer_join(schema, book, "store").unwrap();
        RowLayout::new(
            schema,
            &[
                Projection::Entity(book),
                Projection::Expression(book.get("name")),
                Projection::Entity(store),
            ],
        )
        .unwrap()
    }

    #[test]
    fn decode_entities() {
        let schema = schema();
        let layout = layout(&schema);
        assert_eq!(layout.width(), 6);
        let row: Row = [
            Value::Int32(Some(1)),
            Value::Varchar(Some("Learning GraphQL".into())),
            Value::Int64(Some(9)),
            Value::Varchar(Some("Learning GraphQL".into())),
            Value::Int64(None),
            Value::Varchar(None),
        ]
        .into();
        let (book, name, store) =
            <(Entity, String, Option<Entity>)>::from_row(layout.decode(&schema, row).unwrap())
                .unwrap();
        let ty = schema.find_type("Book").unwrap();
        assert_eq!(book.id(&schema).unwrap(), Value::Int64(Some(1)));
        assert!(matches!(
            book.scalar(ty.prop("id").unwrap().key()),
            Some(Value::Int64(Some(1)))
        ));
        let store_ref = book.reference(ty.prop("store").unwrap().key()).unwrap();
        assert_eq!(store_ref.id(&schema).unwrap(), Value::Int64(Some(9)));
        assert_eq!(store_ref.loaded().count(), 1);
        assert_eq!(name, "Learning GraphQL");
        assert_eq!(store, None);
    }

    #[test]
    fn mapping_errors() {
        let schema = schema();
        let layout = layout(&schema);
        let short: Row = [Value::Int64(Some(1))].into();
        assert!(matches!(
            layout.decode(&schema, short).unwrap_err().downcast_ref::<OrmError>(),
            Some(OrmError::Mapping(..))
        ));

        let items = vec![Fetched::Value(Value::Varchar(Some("x".into())))];
        let error = i64::from_row(items.clone()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<OrmError>(),
            Some(OrmError::Mapping(..))
        ));
        let error = <(String, i64)>::from_row(items.clone()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<OrmError>(),
            Some(OrmError::Mapping(..))
        ));
        let error = Value::from_row(vec![
            Fetched::Value(Value::Null),
            Fetched::Value(Value::Null),
        ])
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<OrmError>(),
            Some(OrmError::Mapping(..))
        ));
        assert!(Entity::from_row(vec![Fetched::Entity(None)]).is_err());
        assert_eq!(
            Option::<String>::from_row(vec![Fetched::Value(Value::Varchar(None))]).unwrap(),
            None
        );
    }

    #[test]
    fn rows_affected_extend() {
        let mut total = RowsAffected::default();
        total.extend([
            RowsAffected {
                rows_affected: 2,
                last_affected_id: Some(3),
            },
            RowsAffected {
                rows_affected: 1,
                last_affected_id: None,
            },
        ]);
        assert_eq!(total.rows_affected, 3);
        assert_eq!(total.last_affected_id, Some(3));
    }
}
