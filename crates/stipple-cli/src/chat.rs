use std::io::{BufRead, ErrorKind, Write};
use std::path::Path;

use anyhow::Result;
use stipple_contracts::chat::{parse_chat_line, ChatCommand, CHAT_HELP_COMMANDS};
use stipple_engine::TaskDispatcher;

/// Line-oriented session over the dispatcher. Returns once input ends or `/quit` is read.
pub fn run_chat<R: BufRead, W: Write>(
    dispatcher: &TaskDispatcher,
    mut input: R,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Stipple chat started. Type /help for commands.")?;
    let mut line = String::new();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let outcome = match parse_chat_line(line.trim_end_matches(['\n', '\r'])) {
            ChatCommand::Noop => continue,
            ChatCommand::Quit => break,
            ChatCommand::Help => {
                writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
                writeln!(
                    out,
                    "Anything else is read as an instruction: \"create image ...\" or \"modify image ...\"."
                )?;
                continue;
            }
            ChatCommand::Current => {
                match dispatcher.current_image() {
                    Some(path) => writeln!(out, "Current image: {}", path.display())?,
                    None => writeln!(out, "No current image.")?,
                }
                continue;
            }
            ChatCommand::UseImage { path } => {
                if path.is_empty() {
                    writeln!(out, "/use requires a path")?;
                } else if !Path::new(&path).is_file() {
                    writeln!(out, "Image not found: {path}")?;
                } else {
                    dispatcher.set_current_image(&path);
                    writeln!(out, "Current image set to {path}")?;
                }
                continue;
            }
            ChatCommand::Unknown { command, .. } => {
                writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
                continue;
            }
            ChatCommand::Generate { prompt } => dispatcher.generate(&prompt),
            ChatCommand::Modify(request) => dispatcher.modify(&request),
            ChatCommand::Instruction { text } => dispatcher
                .apply_instruction(&text)
                .map(|outcome| outcome.image_path),
        };

        match outcome {
            Ok(path) => writeln!(out, "Saved {}", path.display())?,
            Err(err) => writeln!(out, "Error: {err}")?,
        }
    }

    Ok(())
}
