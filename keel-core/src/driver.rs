use crate::writer::SqlWriter;

/// Database product behind an [`crate::Executor`], it supplies the dialect.
pub trait Driver: Send + Sync {
    type SqlWriter: SqlWriter;

    const NAME: &'static str;

    fn sql_writer(&self) -> Self::SqlWriter;
}
