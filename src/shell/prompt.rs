use std::io::{BufRead, Write};

use crate::engine::{CabinetError, Result};

/// Line-oriented console over any reader/writer pair.
pub struct Console<'a> {
    input: &'a mut dyn BufRead,
    output: &'a mut dyn Write,
}

impl<'a> Console<'a> {
    pub fn new(input: &'a mut dyn BufRead, output: &'a mut dyn Write) -> Self {
        Self { input, output }
    }

    /// Next input line without its line terminator; `None` at end of input.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    pub fn prompt(&mut self, text: &str) -> Result<()> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;
        Ok(())
    }

    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{}", text)?;
        Ok(())
    }

    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// Asks for one value until `convert` accepts the answer.
    pub fn ask<T>(&mut self, label: &str, convert: impl Fn(&str) -> Result<T>) -> Result<T> {
        loop {
            self.prompt(&format!("{}: ", label))?;
            let line = self
                .read_line()?
                .ok_or_else(|| CabinetError::Argument(format!("input ended while reading {}", label)))?;
            match convert(line.trim()) {
                Ok(value) => return Ok(value),
                Err(e) => self.say(&format!("Conversion failed: {}. Please, correct your input.", e))?,
            }
        }
    }

    /// Yes/no question; an empty answer means yes.
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        loop {
            self.prompt(&format!("{} [Y/n] ", question))?;
            let Some(answer) = self.read_line()? else {
                return Ok(false);
            };
            match answer.trim().to_ascii_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => continue,
            }
        }
    }
}
