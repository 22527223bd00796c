use crate::writer::SqlWriter;

/// Numbered `$n` placeholders and native `ilike`.
#[derive(Default, Debug, Clone, Copy)]
pub struct PostgresSqlWriter;

impl SqlWriter for PostgresSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn write_placeholder(&self, out: &mut String, index: usize) {
        let mut buffer = itoa::Buffer::new();
        out.push('$');
        out.push_str(buffer.format(index));
    }

    fn supports_ilike(&self) -> bool {
        true
    }
}
