use rust_decimal::Decimal;
use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
    str::FromStr,
};
use tracing::info;

use super::{print_records, print_table, Console, Flow, Session};
use crate::engine::{parse_date, CabinetError, FileCabinetRecord, RecordParameters, Result};
use crate::sql::{plan_and_exec, QueryOutput};
use crate::transfer::Format;

type Handler = fn(&mut Session, &mut Console<'_>, &str) -> Result<Flow>;

/// One entry of the dispatch table.
pub struct Command {
    pub name: &'static str,
    pub summary: &'static str,
    pub usage: &'static str,
    handler: Handler,
}

/// Commands in help order.
pub const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        summary: "prints the help screen",
        usage: "help [command] - prints all commands or the details of one",
        handler: help,
    },
    Command {
        name: "exit",
        summary: "exits the application",
        usage: "exit - closes the data file and leaves",
        handler: exit,
    },
    Command {
        name: "stat",
        summary: "prints the record count",
        usage: "stat - prints how many records are stored and how many are deleted",
        handler: stat,
    },
    Command {
        name: "create",
        summary: "creates a new record",
        usage: "create - asks for every field and stores the record under a new id",
        handler: create,
    },
    Command {
        name: "insert",
        summary: "inserts a record with the given values",
        usage: "insert (id, firstname, lastname, dateofbirth, grade, height, favouritesymbol) values ('1', 'John', 'Smith', '05/20/1990', '4', '1.8', '$')",
        handler: insert,
    },
    Command {
        name: "list",
        summary: "prints all records",
        usage: "list - prints every record in store order",
        handler: list,
    },
    Command {
        name: "edit",
        summary: "edits a record",
        usage: "edit <id> - asks for every field of the record again",
        handler: edit,
    },
    Command {
        name: "find",
        summary: "finds records by a field",
        usage: "find firstname|lastname|dateofbirth <value> - e.g. find dateofbirth 1990-May-20",
        handler: find,
    },
    Command {
        name: "export",
        summary: "exports records to a file",
        usage: "export csv|xml <path>",
        handler: export,
    },
    Command {
        name: "import",
        summary: "imports records from a file",
        usage: "import csv|xml <path> - records with a known id replace it",
        handler: import,
    },
    Command {
        name: "remove",
        summary: "removes a record",
        usage: "remove <id>",
        handler: remove,
    },
    Command {
        name: "purge",
        summary: "compacts the data file",
        usage: "purge - drops deleted records from the data file",
        handler: purge,
    },
    Command {
        name: "update",
        summary: "updates matching records",
        usage: "update set field = 'value'[, ...] where field = 'value' [and|or ...]",
        handler: update,
    },
    Command {
        name: "delete",
        summary: "deletes matching records",
        usage: "delete where field = 'value' [and|or ...]",
        handler: delete,
    },
    Command {
        name: "select",
        summary: "prints chosen fields of matching records",
        usage: "select [field, ...] [where field = 'value' [and|or ...]]",
        handler: select,
    },
];

pub(super) fn dispatch(
    session: &mut Session,
    console: &mut Console<'_>,
    name: &str,
    params: &str,
) -> Result<Flow> {
    let name = name.to_ascii_lowercase();
    match COMMANDS.iter().find(|c| c.name == name) {
        Some(command) => (command.handler)(session, console, params),
        None => {
            console.say(&format!("There is no '{}' command.", name))?;
            let similar = similar_commands(&name);
            if !similar.is_empty() {
                console.say("The most similar commands are:")?;
                for command in similar {
                    console.say(&format!("\t{}", command))?;
                }
            }
            Ok(Flow::Continue)
        }
    }
}

/// Command names within two edits of `input` or sharing its first two letters.
pub fn similar_commands(input: &str) -> Vec<&'static str> {
    let prefix: String = input.chars().take(2).collect();
    COMMANDS
        .iter()
        .map(|c| c.name)
        .filter(|name| edit_distance(input, name) <= 2 || (prefix.len() == 2 && name.starts_with(&prefix)))
        .collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + usize::from(ca != cb));
            diagonal = above;
        }
    }
    row[b.len()]
}

fn help(_: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    if params.is_empty() {
        console.say("Available commands:")?;
        for command in COMMANDS {
            console.say(&format!("\t{:<8} - {}", command.name, command.summary))?;
        }
        return Ok(Flow::Continue);
    }
    let wanted = params.to_ascii_lowercase();
    match COMMANDS.iter().find(|c| c.name == wanted) {
        Some(command) => console.say(command.usage)?,
        None => console.say(&format!("There is no explanation for '{}' command.", params))?,
    }
    Ok(Flow::Continue)
}

fn exit(session: &mut Session, console: &mut Console<'_>, _: &str) -> Result<Flow> {
    session.service_mut().close()?;
    console.say("Exiting an application...")?;
    Ok(Flow::Exit)
}

fn stat(session: &mut Session, console: &mut Console<'_>, _: &str) -> Result<Flow> {
    let stat = session.service().stat()?;
    console.say(&format!("{} record(s). {} deleted.", stat.total, stat.deleted))?;
    Ok(Flow::Continue)
}

fn ask_parameters(console: &mut Console<'_>) -> Result<RecordParameters> {
    let text = |s: &str| -> Result<String> { Ok(s.to_string()) };
    Ok(RecordParameters {
        first_name: console.ask("First name", text)?,
        last_name: console.ask("Last name", text)?,
        date_of_birth: console.ask("Date of birth", parse_date)?,
        grade: console.ask("Grade", |s| parse_number::<i16>(s, "grade"))?,
        height: console.ask("Height", |s| {
            Decimal::from_str(s).map_err(|_| CabinetError::Parse(format!("'{}' is not a valid height", s)))
        })?,
        favourite_symbol: console.ask("Favourite symbol", |s| {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(CabinetError::Parse("enter exactly one character".into())),
            }
        })?,
    })
}

fn parse_number<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| CabinetError::Parse(format!("'{}' is not a valid {}", raw.trim(), what)))
}

fn create(session: &mut Session, console: &mut Console<'_>, _: &str) -> Result<Flow> {
    let params = ask_parameters(console)?;
    let id = session.service_mut().create(&params)?;
    console.say(&format!("Record #{} is created.", id))?;
    Ok(Flow::Continue)
}

fn edit(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    let id: u32 = parse_number(params, "id")?;
    if session.service().find_by_id(id)?.is_none() {
        return Err(CabinetError::NotFound(id));
    }
    let fields = ask_parameters(console)?;
    session
        .service_mut()
        .edit(&FileCabinetRecord::from_parameters(id, &fields))?;
    console.say(&format!("Record #{} is updated.", id))?;
    Ok(Flow::Continue)
}

fn list(session: &mut Session, console: &mut Console<'_>, _: &str) -> Result<Flow> {
    let records = session.service().list()?;
    show(console, &records)
}

fn show(console: &mut Console<'_>, records: &[FileCabinetRecord]) -> Result<Flow> {
    if records.is_empty() {
        console.say("No records found.")?;
    } else {
        print_records(console.output(), records)?;
    }
    Ok(Flow::Continue)
}

fn find(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    let (field, value) = params
        .split_once(char::is_whitespace)
        .ok_or_else(|| CabinetError::Argument("expected 'find <field> <value>'".into()))?;
    let value = unquote(value.trim());
    let service = session.service();
    let records = match field.to_ascii_lowercase().as_str() {
        "firstname" => service.find_by_first_name(value)?,
        "lastname" => service.find_by_last_name(value)?,
        "dateofbirth" => service.find_by_date_of_birth(value)?,
        other => {
            return Err(CabinetError::Argument(format!(
                "cannot find by '{}'; use firstname, lastname or dateofbirth",
                other
            )))
        }
    };
    show(console, &records)
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|&q| value.strip_prefix(q).and_then(|v| v.strip_suffix(q)))
        .unwrap_or(value)
}

fn remove(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    let id: u32 = parse_number(params, "id")?;
    session.service_mut().remove(id)?;
    console.say(&format!("Record #{} is removed.", id))?;
    Ok(Flow::Continue)
}

fn purge(session: &mut Session, console: &mut Console<'_>, _: &str) -> Result<Flow> {
    let report = session.service_mut().purge()?;
    console.say(&format!(
        "Data file processing is completed: {} of {} records were purged.",
        report.purged, report.total
    ))?;
    Ok(Flow::Continue)
}

fn transfer_arguments(params: &str) -> Result<(Format, &str)> {
    let (format, path) = params
        .split_once(char::is_whitespace)
        .ok_or_else(|| CabinetError::Argument("expected '<csv|xml> <path>'".into()))?;
    Ok((format.parse()?, unquote(path.trim())))
}

fn export(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    let (format, path) = transfer_arguments(params)?;
    if Path::new(path).exists() && !console.confirm(&format!("File {} already exists. Rewrite?", path))? {
        console.say("Export cancelled.")?;
        return Ok(Flow::Continue);
    }
    let snapshot = session.service().snapshot()?;
    let file = File::create(path).map_err(|e| file_error(path, e))?;
    format.write_snapshot(&snapshot, BufWriter::new(file))?;
    info!(%format, path, records = snapshot.len(), "exported");
    console.say(&format!("All records are exported to file {}.", path))?;
    Ok(Flow::Continue)
}

fn import(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    let (format, path) = transfer_arguments(params)?;
    let file = File::open(path).map_err(|e| file_error(path, e))?;
    let load = format.read_snapshot(BufReader::new(file))?;
    for skipped in &load.skipped {
        console.say(&format!("Entry {} is skipped: {}", skipped.position, skipped.error))?;
    }
    let report = session.service_mut().restore(&load.snapshot)?;
    for (id, error) in &report.rejected {
        console.say(&format!("Record #{} is skipped: {}", id, error))?;
    }
    console.say(&format!("{} records were imported from {}.", report.imported, path))?;
    Ok(Flow::Continue)
}

fn file_error(path: &str, e: io::Error) -> CabinetError {
    match e.kind() {
        io::ErrorKind::NotFound => CabinetError::Argument(format!("file {} does not exist", path)),
        _ => CabinetError::Io(io::Error::new(e.kind(), format!("{}: {}", path, e))),
    }
}

fn insert(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    run_query(session, console, "insert", params)
}

fn update(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    run_query(session, console, "update", params)
}

fn delete(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    run_query(session, console, "delete", params)
}

fn select(session: &mut Session, console: &mut Console<'_>, params: &str) -> Result<Flow> {
    run_query(session, console, "select", params)
}

fn run_query(session: &mut Session, console: &mut Console<'_>, command: &str, params: &str) -> Result<Flow> {
    let Session { service, cache } = session;
    match plan_and_exec(service.as_mut(), cache, command, params)? {
        QueryOutput::Inserted(id) => console.say(&format!("Record #{} is inserted.", id))?,
        QueryOutput::Updated(ids) => console.say(&summarize(&ids, "updated"))?,
        QueryOutput::Deleted(ids) => console.say(&summarize(&ids, "deleted"))?,
        QueryOutput::Selected { columns, selection } => {
            print_table(console.output(), &columns, &selection.records)?
        }
    }
    Ok(Flow::Continue)
}

/// `Record #1 is deleted.` / `Records #1, #3 are deleted.`
fn summarize(ids: &[u32], verb: &str) -> String {
    let list = ids.iter().map(|id| format!("#{}", id)).collect::<Vec<_>>().join(", ");
    match ids.len() {
        0 => format!("No records are {}.", verb),
        1 => format!("Record {} is {}.", list, verb),
        _ => format!("Records {} are {}.", list, verb),
    }
}
