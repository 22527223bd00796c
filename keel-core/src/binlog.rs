use crate::{
    AsProp, AsType, AssociationEventKind, Entity, EntityEvent, Event, ImmutableProp, ImmutableType,
    OrmError, PropKind, PropValue, Result, Schema, Triggers, Value,
    draft::coerce,
    trigger::{association_event, reference_change_events},
};
use rust_decimal::Decimal;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::well_known::Rfc3339,
    macros::format_description,
};
use uuid::Uuid;

/// Reader of rows captured from the change stream of the database, keyed by column name.
///
/// Column names match ignoring ASCII case and one pair of `""`, `` ` ` `` or `[]` quotes, columns
/// without a prop are skipped. Text values are parsed into the type of their column.
#[derive(Debug, Clone, Copy)]
pub struct BinLog<'s> {
    schema: &'s Schema,
}

impl<'s> BinLog<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Entity holding the columns of `row`, references as id only targets.
    pub fn parse_entity<N: AsRef<str>>(
        &self,
        ty: impl AsType,
        row: impl IntoIterator<Item = (N, Value)>,
    ) -> Result<Entity> {
        let ty = ty.resolve_type(self.schema)?;
        if ty.is_mapped_superclass() {
            return Err(OrmError::invalid_path(format!(
                "the mapped superclass `{}` has no rows",
                ty.name()
            )));
        }
        let mut entity = Entity::new(ty);
        for (column, value) in row {
            let column = column.as_ref();
            let Some(prop) = ty
                .column_props()
                .find(|p| same_column(p.column_name().unwrap_or_default(), column))
            else {
                log::trace!("`{}` has no column `{column}`, skipped", ty.name());
                continue;
            };
            let slot = match prop.kind() {
                PropKind::Reference => {
                    let target = self.target(ty, prop)?;
                    let id = column_value(ty, prop, target.id_prop()?.prototype(), value)?;
                    if id.is_null() {
                        PropValue::Reference(None)
                    } else {
                        PropValue::reference(Some(Entity::id_only(target, id)?))
                    }
                }
                _ => PropValue::Scalar(column_value(ty, prop, prop.prototype(), value)?),
            };
            entity.set_slot(prop.key(), slot)?;
        }
        entity.id(self.schema).map_err(|_| {
            OrmError::mapping(format!("the `{}` row has no id column", ty.table_name()))
        })?;
        Ok(entity)
    }

    /// Source and target ids of a middle table row, seen from `prop`.
    ///
    /// The same row read through the inverse prop gives the reversed pair.
    pub fn parse_id_pair<N: AsRef<str>>(
        &self,
        ty: impl AsType,
        prop: impl AsProp,
        row: impl IntoIterator<Item = (N, Value)>,
    ) -> Result<(Value, Value)> {
        let ty = ty.resolve_type(self.schema)?;
        let prop = prop.resolve_prop(self.schema, ty)?;
        let middle = self.schema.middle_table(prop)?;
        let target = self.target(ty, prop)?;
        let (mut source_id, mut target_id) = (None, None);
        for (column, value) in row {
            let column = column.as_ref();
            if same_column(&middle.join_column, column) {
                source_id = Some(column_value(ty, prop, ty.id_prop()?.prototype(), value)?);
            } else if same_column(&middle.target_column, column) {
                target_id = Some(column_value(ty, prop, target.id_prop()?.prototype(), value)?);
            }
        }
        match (source_id, target_id) {
            (Some(source), Some(target)) if !source.is_null() && !target.is_null() => {
                Ok((source, target))
            }
            _ => Err(OrmError::mapping(format!(
                "the `{}` row needs non null `{}` and `{}`",
                middle.table, middle.join_column, middle.target_column
            ))),
        }
    }

    /// Fires the change of one row of the table of `ty`: `old` is the image before the change,
    /// `new` the image after it.
    ///
    /// Changed foreign keys also fire the association events of their reference prop.
    pub fn fire_entity_change<N: AsRef<str>, R: IntoIterator<Item = (N, Value)>>(
        &self,
        triggers: &Triggers,
        ty: impl AsType,
        old: Option<R>,
        new: Option<R>,
        reason: Option<&str>,
    ) -> Result<()> {
        let ty = ty.resolve_type(self.schema)?;
        let old = old.map(|v| self.parse_entity(ty, v)).transpose()?;
        let new = new.map(|v| self.parse_entity(ty, v)).transpose()?;
        let Some(snapshot) = new.as_ref().or(old.as_ref()) else {
            return Ok(());
        };
        let id = snapshot.id(self.schema)?;
        let mut references = Vec::new();
        for prop in ty.props() {
            if !matches!(prop.kind(), PropKind::Reference) {
                continue;
            }
            // Partial images leave the reference unknown
            let (Some(old_target), Some(new_target)) = (
                self.image_target(old.as_ref(), prop)?,
                self.image_target(new.as_ref(), prop)?,
            ) else {
                continue;
            };
            references.extend(reference_change_events(
                prop.key(),
                id.clone(),
                old_target,
                new_target,
                reason,
            ));
        }
        let mut events = vec![Event::Entity(EntityEvent {
            ty: ty.key(),
            id,
            old,
            new,
            reason: reason.map(Into::into),
        })];
        events.extend(references);
        triggers.fire_all(events)
    }

    /// Fires the change of one middle table row of `prop`, a delete of the old pair followed by
    /// an insert of the new one.
    pub fn fire_middle_table_change<N: AsRef<str>, R: IntoIterator<Item = (N, Value)>>(
        &self,
        triggers: &Triggers,
        ty: impl AsType,
        prop: impl AsProp,
        old: Option<R>,
        new: Option<R>,
        reason: Option<&str>,
    ) -> Result<()> {
        let ty = ty.resolve_type(self.schema)?;
        let prop = prop.resolve_prop(self.schema, ty)?;
        let old = old.map(|v| self.parse_id_pair(ty, prop, v)).transpose()?;
        let new = new.map(|v| self.parse_id_pair(ty, prop, v)).transpose()?;
        if old == new {
            return Ok(());
        }
        let mut events = Vec::with_capacity(2);
        if let Some((source, target)) = old {
            events.push(association_event(
                prop.key(),
                source,
                target,
                AssociationEventKind::Delete,
                reason,
            ));
        }
        if let Some((source, target)) = new {
            events.push(association_event(
                prop.key(),
                source,
                target,
                AssociationEventKind::Insert,
                reason,
            ));
        }
        triggers.fire_all(events)
    }

    fn target(&self, ty: &ImmutableType, prop: &ImmutableProp) -> Result<&'s ImmutableType> {
        let target = prop.target_type().ok_or_else(|| {
            OrmError::invalid_path(format!(
                "`{}.{}` is not an association",
                ty.name(),
                prop.name()
            ))
        })?;
        self.schema.ty(target)
    }

    /// `None` when the image lacks the column, `Some(None)` without image or foreign key.
    fn image_target(
        &self,
        image: Option<&Entity>,
        prop: &ImmutableProp,
    ) -> Result<Option<Option<Value>>> {
        let Some(value) = image.and_then(|v| v.get(prop.key())) else {
            return Ok(image.is_none().then_some(None));
        };
        Ok(Some(
            value
                .as_reference()
                .map(|v| v.id(self.schema))
                .transpose()?,
        ))
    }
}

fn same_column(column: &str, name: &str) -> bool {
    let name = name.trim();
    let name = [('"', '"'), ('`', '`'), ('[', ']')]
        .into_iter()
        .find_map(|(open, close)| name.strip_prefix(open)?.strip_suffix(close))
        .unwrap_or(name);
    column.eq_ignore_ascii_case(name)
}

fn column_value(
    ty: &ImmutableType,
    prop: &ImmutableProp,
    prototype: &Value,
    value: Value,
) -> Result<Value> {
    let result = match value {
        Value::Varchar(Some(text)) if !matches!(prototype, Value::Varchar(..) | Value::Null) => {
            parse_text(prototype, text.trim())
        }
        value => coerce(prototype, value),
    };
    result.map_err(|e| OrmError::mapping(format!("{}.{}: {e:#}", ty.name(), prop.name())))
}

/// Change streams encode most columns as text.
fn parse_text(prototype: &Value, text: &str) -> Result<Value> {
    Ok(match prototype {
        Value::Boolean(..) => Value::Boolean(Some(match text {
            "1" => true,
            "0" => false,
            v if v.eq_ignore_ascii_case("true") => true,
            v if v.eq_ignore_ascii_case("false") => false,
            _ => return Err(crate::Error::msg(format!("`{text}` is not a boolean"))),
        })),
        Value::Int8(..) | Value::Int16(..) | Value::Int32(..) | Value::Int64(..) => {
            coerce(prototype, Value::Int64(Some(text.parse()?)))?
        }
        Value::Float32(..) => Value::Float32(Some(text.parse()?)),
        Value::Float64(..) => Value::Float64(Some(text.parse()?)),
        Value::Decimal(..) => Value::Decimal(Some(text.parse::<Decimal>()?)),
        Value::Blob(..) => Value::Blob(Some(
            hex::decode(text.strip_prefix("0x").unwrap_or(text))?.into_boxed_slice(),
        )),
        Value::Date(..) => Value::Date(Some(Date::parse(
            text,
            format_description!("[year]-[month]-[day]"),
        )?)),
        Value::Time(..) => Value::Time(Some(
            Time::parse(text, format_description!("[hour]:[minute]:[second].[subsecond]"))
                .or(Time::parse(text, format_description!("[hour]:[minute]:[second]")))?,
        )),
        Value::Timestamp(..) => Value::Timestamp(Some(
            PrimitiveDateTime::parse(
                text,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
            )
            .or(PrimitiveDateTime::parse(
                text,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            ))
            .or(PrimitiveDateTime::parse(
                text,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
            ))
            .or(PrimitiveDateTime::parse(
                text,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            ))?,
        )),
        Value::TimestampWithTimezone(..) => {
            Value::TimestampWithTimezone(Some(OffsetDateTime::parse(text, &Rfc3339)?))
        }
        Value::Uuid(..) => Value::Uuid(Some(Uuid::parse_str(text)?)),
        Value::Varchar(..) | Value::Null => Value::Varchar(Some(text.into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdGeneration, TypeBuilder};

    fn schema() -> Schema {
        Schema::builder()
            .add(
                TypeBuilder::entity("TreeNode")
                    .id("id", Value::Int64(None), IdGeneration::None)
                    .column("NODE_ID")
                    .scalar("name", Value::Varchar(None))
                    .scalar("opened", Value::Boolean(None))
                    .scalar("touched", Value::Timestamp(None))
                    .nullable()
                    .reference("parent", "TreeNode")
                    .nullable(),
            )
            .build()
            .expect("valid schema")
    }

    #[test]
    fn quoted_and_mixed_case_columns() {
        let schema = schema();
        let node = BinLog::new(&schema)
            .parse_entity(
                "TreeNode",
                [
                    ("Node_Id", Value::Int32(Some(2))),
                    ("[Name]", Value::Varchar(Some("3".into()))),
                    ("`Parent_Id`", Value::Varchar(Some("1".into()))),
                    ("\"OPENED\"", Value::Varchar(Some("true".into()))),
                    ("Touched", Value::Varchar(Some("2022-10-03 00:10:00".into()))),
                    ("unknown", Value::Int32(Some(9))),
                ],
            )
            .unwrap();
        let key = |name: &str| schema.prop_key("TreeNode", name).unwrap();
        assert_eq!(node.id(&schema).unwrap(), Value::Int64(Some(2)));
        assert_eq!(node.value::<String>(key("name")).unwrap(), "3");
        assert_eq!(node.value::<bool>(key("opened")).unwrap(), true);
        assert_eq!(
            node.scalar(key("touched")),
            Some(&Value::Timestamp(Some(time::macros::datetime!(2022-10-03 00:10))))
        );
        assert_eq!(
            node.reference(key("parent")).map(|v| v.id(&schema).unwrap()),
            Some(Value::Int64(Some(1)))
        );
    }

    #[test]
    fn unreadable_rows() {
        let schema = schema();
        let binlog = BinLog::new(&schema);
        let error = binlog
            .parse_entity("TreeNode", [("name", Value::Varchar(Some("x".into())))])
            .unwrap_err();
        assert!(matches!(crate::error_kind(&error), Some(OrmError::Mapping(..))));

        let error = binlog
            .parse_entity(
                "TreeNode",
                [
                    ("node_id", Value::Int64(Some(1))),
                    ("opened", Value::Varchar(Some("maybe".into()))),
                ],
            )
            .unwrap_err();
        assert!(format!("{error:#}").contains("TreeNode.opened"));

        let node = binlog
            .parse_entity(
                "TreeNode",
                [("node_id", Value::Int64(Some(1))), ("parent_id", Value::Null)],
            )
            .unwrap();
        let parent = schema.prop_key("TreeNode", "parent").unwrap();
        assert_eq!(node.get(parent), Some(&PropValue::Reference(None)));
    }
}
