/// Converts a camel case or snake case name into the upper snake case form used for tables and columns.
///
/// ```rust
/// use keel_core::upper_snake_case;
/// assert_eq!(upper_snake_case("BookStore"), "BOOK_STORE");
/// assert_eq!(upper_snake_case("firstName"), "FIRST_NAME");
/// assert_eq!(upper_snake_case("created_time"), "CREATED_TIME");
/// ```
pub fn upper_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for c in name.chars() {
        if c.is_uppercase()
            && previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
        {
            out.push('_');
        }
        out.extend(c.to_uppercase());
        previous = Some(c);
    }
    out
}

const RESERVED: &[&str] = &[
    "all", "and", "as", "between", "by", "case", "check", "column", "constraint", "create",
    "delete", "desc", "distinct", "drop", "else", "exists", "from", "group", "having", "in",
    "index", "insert", "into", "is", "join", "key", "left", "like", "limit", "not", "null",
    "offset", "on", "or", "order", "primary", "references", "right", "select", "set", "table",
    "then", "to", "union", "unique", "update", "user", "values", "when", "where",
];

/// Whether the name can be written without quotes.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

#[macro_export]
macro_rules! possibly_parenthesized {
    ($buff:expr, $cond:expr, $v:expr) => {
        if $cond {
            $buff.sql("(");
            $v;
            $buff.sql(")");
        } else {
            $v;
        }
    };
}

/// Largest char boundary of `value` not after `index`.
pub fn floor_char_boundary(value: &str, index: usize) -> usize {
    let mut index = index.min(value.len());
    while !value.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            &$query[..$crate::floor_char_boundary(&$query, 497)].trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}
