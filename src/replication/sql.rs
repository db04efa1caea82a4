// ABOUTME: Identifier and literal quoting for replication DDL
// ABOUTME: Builds the CREATE/ALTER PUBLICATION and CREATE SUBSCRIPTION statements

use super::subscription::SubscriptionSpec;

/// Quote an SQL identifier, doubling embedded double quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a `schema.table` reference component-wise.
///
/// Anything that does not split into exactly two parts on `.` is quoted whole.
pub fn quote_table(table: &str) -> String {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() == 2 {
        format!("{}.{}", quote_ident(parts[0]), quote_ident(parts[1]))
    } else {
        quote_ident(table)
    }
}

fn table_list(tables: &[String]) -> String {
    tables
        .iter()
        .map(|t| quote_table(t))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn create_publication(name: &str, tables: &[String]) -> String {
    format!(
        "CREATE PUBLICATION {} FOR TABLE {}",
        quote_ident(name),
        table_list(tables)
    )
}

pub fn alter_publication_add_tables(name: &str, tables: &[String]) -> String {
    format!(
        "ALTER PUBLICATION {} ADD TABLE {}",
        quote_ident(name),
        table_list(tables)
    )
}

pub fn create_subscription(spec: &SubscriptionSpec) -> String {
    format!(
        "CREATE SUBSCRIPTION {} CONNECTION {} PUBLICATION {} WITH (copy_data = {}, create_slot = {}, enabled = {})",
        quote_ident(&spec.name),
        quote_literal(&spec.conn_string),
        quote_ident(&spec.publication),
        spec.copy_data,
        spec.create_slot,
        spec.enabled
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_double_quotes() {
        assert_eq!(quote_ident("repl_pub"), "\"repl_pub\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal_escapes_single_quotes() {
        assert_eq!(quote_literal("host=pg"), "'host=pg'");
        assert_eq!(quote_literal("password=it's"), "'password=it''s'");
    }

    #[test]
    fn test_quote_table_splits_schema() {
        assert_eq!(quote_table("public.repl_test"), "\"public\".\"repl_test\"");
        assert_eq!(quote_table("repl_test"), "\"repl_test\"");
        assert_eq!(quote_table("a.b.c"), "\"a.b.c\"");
    }

    #[test]
    fn test_create_publication_lists_all_tables() {
        let tables = vec!["public.a".to_string(), "audit.b".to_string()];
        assert_eq!(
            create_publication("pub", &tables),
            "CREATE PUBLICATION \"pub\" FOR TABLE \"public\".\"a\", \"audit\".\"b\""
        );
    }

    #[test]
    fn test_create_subscription_statement() {
        let spec = SubscriptionSpec {
            name: "repl_sub_1".to_string(),
            conn_string: "host=pg-primary password=o'k".to_string(),
            publication: "repl_pub".to_string(),
            copy_data: true,
            create_slot: false,
            enabled: true,
        };
        assert_eq!(
            create_subscription(&spec),
            "CREATE SUBSCRIPTION \"repl_sub_1\" CONNECTION 'host=pg-primary password=o''k' \
             PUBLICATION \"repl_pub\" WITH (copy_data = true, create_slot = false, enabled = true)"
        );
    }
}
