// ABOUTME: Read-only source browsing commands: databases, tables and row previews
// ABOUTME: Output is plain text by default or JSON with --json

use super::AppContext;
use crate::row::Row;
use anyhow::{bail, Result};

pub async fn databases(ctx: &AppContext, json: bool) -> Result<()> {
    let source = ctx.source().await?;
    let result = source.list_databases().await;
    source.close().await?;
    let names = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        println!("No databases found.");
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

pub async fn tables(ctx: &AppContext, db_name: &str, json: bool) -> Result<()> {
    let db_name = db_name.trim();
    if db_name.is_empty() {
        bail!("Database name is required.");
    }

    let source = ctx.source().await?;
    let result = source.list_tables(db_name).await;
    source.close().await?;
    let names = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        println!("No tables found in database \"{}\".", db_name);
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

pub async fn preview(
    ctx: &AppContext,
    db_name: &str,
    table_name: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let (db_name, table_name) = (db_name.trim(), table_name.trim());
    if db_name.is_empty() || table_name.is_empty() {
        bail!("Database and table names are required.");
    }

    let source = ctx.source().await?;
    let result = async {
        if !source.table_exists(db_name, table_name).await? {
            bail!(
                "Table \"{}\" does not exist in database \"{}\".",
                table_name,
                db_name
            );
        }
        source.get_table_preview(db_name, table_name, limit).await
    }
    .await;
    source.close().await?;
    let rows = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render_table(&rows));
        println!("({} row(s))", rows.len());
    }
    Ok(())
}

/// Render rows as an aligned text table using the first row's columns.
fn render_table(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns: Vec<&str> = first.columns().collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| {
                    row.get(c)
                        .and_then(|cell| cell.as_text())
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(columns.clone()));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Cell;

    #[test]
    fn test_render_table_aligns_columns() {
        let rows: Vec<Row> = vec![
            vec![("id", Cell::Int(1)), ("name", Cell::from("alpha"))]
                .into_iter()
                .collect(),
            vec![("id", Cell::Int(10)), ("name", Cell::Null)]
                .into_iter()
                .collect(),
        ];
        let rendered = render_table(&rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "id | name");
        assert_eq!(lines[1], "---+------");
        assert_eq!(lines[2], "1  | alpha");
        assert_eq!(lines[3], "10 | NULL");
    }

    #[test]
    fn test_render_table_empty() {
        assert_eq!(render_table(&[]), "");
    }
}
