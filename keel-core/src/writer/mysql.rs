use crate::{
    Result,
    writer::{SqlBuilder, SqlWriter, pagination_value},
};
use std::borrow::Cow;

#[derive(Default, Debug, Clone, Copy)]
pub struct MySqlSqlWriter;

impl SqlWriter for MySqlSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }

    fn name(&self) -> &'static str {
        "mysql"
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('`');
        self.write_escaped(out, value, '`', "``");
        out.push('`');
    }

    fn map_function<'n>(&self, name: &'n str, args: usize) -> Result<Cow<'n, str>> {
        Ok(match (name, args) {
            ("length", 1) => Cow::Borrowed("char_length"),
            _ => Cow::Borrowed(name),
        })
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    /// `limit ?` or `limit ?, ?` with the offset first.
    fn write_pagination(
        &self,
        b: &mut SqlBuilder<'_>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<()> {
        if limit.is_none() && offset.is_none() {
            return Ok(());
        }
        let separator = b.clause_separator();
        b.sql(separator);
        b.sql("limit ");
        if let Some(offset) = offset {
            b.variable(pagination_value(offset));
            b.sql(", ");
        }
        b.variable(pagination_value(limit.unwrap_or(u64::MAX)));
        Ok(())
    }
}
