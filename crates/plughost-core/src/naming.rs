//! Command name derivation.

/// Derive a command's declared name from its type name.
///
/// A trailing `Command` suffix is dropped and the CamelCase remainder is
/// converted to snake_case, so `FooBarCommand` becomes `foo_bar`.
pub fn command_name_for_type(type_name: &str) -> String {
    let base = type_name
        .rsplit("::")
        .next()
        .unwrap_or(type_name);
    let base = base.strip_suffix("Command").unwrap_or(base);

    let mut out = String::with_capacity(base.len() + 4);
    for (i, c) in base.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_for_type() {
        assert_eq!(command_name_for_type("FooBarCommand"), "foo_bar");
        assert_eq!(command_name_for_type("Foo"), "foo");
        assert_eq!(command_name_for_type("my_ext::InsertDateCommand"), "insert_date");
    }
}
