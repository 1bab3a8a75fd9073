//! Interactive command loop.
//!
//! Reads one command per line, dispatches it through the command table and
//! prints results or `Error: <message>`. The loop ends on `exit` or at end
//! of input; both close the service.

use std::io::{BufRead, Write};
use tracing::{debug, info};

use crate::engine::{QueryCache, RecordService, Result, DEFAULT_CACHE_CAPACITY};

mod commands;
mod printer;
mod prompt;

pub use commands::{similar_commands, Command, COMMANDS};
pub use printer::{print_records, print_table};
pub use prompt::Console;

/// What the loop does after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// The service a shell drives plus the select cache that goes with it.
pub struct Session {
    service: Box<dyn RecordService>,
    cache: QueryCache,
}

impl Session {
    pub fn new(service: Box<dyn RecordService>) -> Self {
        Self {
            service,
            cache: QueryCache::new(DEFAULT_CACHE_CAPACITY),
        }
    }

    pub fn service(&self) -> &dyn RecordService {
        self.service.as_ref()
    }

    /// Mutable access to the store; drops every memoized select first.
    pub fn service_mut(&mut self) -> &mut dyn RecordService {
        self.cache.clear();
        self.service.as_mut()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }
}

/// Runs commands from `input` until `exit` or end of input.
pub fn run<R: BufRead, W: Write>(session: &mut Session, mut input: R, mut output: W) -> Result<()> {
    let mut console = Console::new(&mut input, &mut output);
    loop {
        console.prompt("> ")?;
        let Some(line) = console.read_line()? else {
            info!("input closed");
            session.service_mut().close()?;
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, params) = match line.split_once(char::is_whitespace) {
            Some((name, params)) => (name, params.trim()),
            None => (line, ""),
        };
        match commands::dispatch(session, &mut console, name, params) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => return Ok(()),
            Err(e) => {
                debug!(command = name, error = %e, "command failed");
                console.say(&format!("Error: {}", e))?;
            }
        }
    }
}
