use std::io::Write;

use crate::engine::{Field, FileCabinetRecord, Result, DISPLAY_DATE_FORMAT};

/// Field value as the console shows it.
fn cell(field: Field, record: &FileCabinetRecord) -> String {
    match field {
        Field::Id => record.id.to_string(),
        Field::FirstName => record.first_name.clone(),
        Field::LastName => record.last_name.clone(),
        Field::DateOfBirth => record.date_of_birth.format(DISPLAY_DATE_FORMAT).to_string(),
        Field::Grade => record.grade.to_string(),
        Field::Height => record.height.to_string(),
        Field::FavouriteSymbol => record.favourite_symbol.to_string(),
    }
}

/// One line per record: `#1, John, Smith, 1990-May-20, 4, 1.8, $`.
pub fn print_records(out: &mut dyn Write, records: &[FileCabinetRecord]) -> Result<()> {
    for record in records {
        let cells: Vec<String> = Field::ALL.iter().map(|&f| cell(f, record)).collect();
        writeln!(out, "#{}", cells.join(", "))?;
    }
    Ok(())
}

/// Renders the chosen columns as an ASCII table; numbers are right aligned.
///
/// ```text
/// +----+-----------+
/// | Id | FirstName |
/// +----+-----------+
/// |  1 | John      |
/// +----+-----------+
/// ```
pub fn print_table(out: &mut dyn Write, columns: &[Field], records: &[FileCabinetRecord]) -> Result<()> {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| columns.iter().map(|&f| cell(f, r)).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, f)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(f.title().len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+";

    writeln!(out, "{}", border)?;
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(f, &w)| format!("| {:<w$} ", f.title(), w = w))
        .collect();
    writeln!(out, "{}|", header)?;
    writeln!(out, "{}", border)?;
    for row in &rows {
        let line: String = columns
            .iter()
            .zip(&widths)
            .zip(row)
            .map(|((f, &w), value)| {
                let pad = w - value.chars().count();
                if f.is_numeric() {
                    format!("| {}{} ", " ".repeat(pad), value)
                } else {
                    format!("| {}{} ", value, " ".repeat(pad))
                }
            })
            .collect();
        writeln!(out, "{}|", line)?;
        writeln!(out, "{}", border)?;
    }
    Ok(())
}
