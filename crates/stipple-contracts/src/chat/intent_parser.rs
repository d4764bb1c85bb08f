use crate::tasks::{Task, TaskRequest};

use super::command_registry::{
    ChatAction, CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
    SPLIT_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Noop,
    Help,
    Quit,
    Current,
    UseImage { path: String },
    Generate { prompt: String },
    Modify(TaskRequest),
    /// Free text, routed through the instruction vocabulary.
    Instruction { text: String },
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<ChatAction> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn non_empty(arg: &str) -> Option<String> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn modify(task: Task, fill: impl FnOnce(&mut TaskRequest)) -> ChatCommand {
    let mut request = TaskRequest::for_task(task);
    fill(&mut request);
    ChatCommand::Modify(request)
}

fn split_arg_command(action: ChatAction, arg: &str) -> ChatCommand {
    let parts = split_args(arg);
    match action {
        ChatAction::Outpaint => modify(Task::Outpaint, |request| {
            request.left = parts.first().and_then(|value| value.parse().ok());
            request.down = parts.get(1).and_then(|value| value.parse().ok());
        }),
        _ => modify(Task::SearchAndReplace, |request| {
            request.search_prompt = parts.first().cloned();
            if parts.len() > 1 {
                request.new_prompt = Some(parts[1..].join(" "));
            }
        }),
    }
}

pub fn parse_chat_line(text: &str) -> ChatCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return ChatCommand::Instruction {
            text: raw_trimmed.to_string(),
        };
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return ChatCommand::Instruction {
            text: raw_trimmed.to_string(),
        };
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return match action {
            ChatAction::Help => ChatCommand::Help,
            ChatAction::Quit => ChatCommand::Quit,
            ChatAction::Current => ChatCommand::Current,
            _ => ChatCommand::Modify(TaskRequest::for_task(Task::RemoveBackground)),
        };
    }

    if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
        return match action {
            ChatAction::Generate => ChatCommand::Generate {
                prompt: arg.to_string(),
            },
            ChatAction::Recolor => modify(Task::Recolor, |request| {
                request.prompt = non_empty(arg);
            }),
            _ => modify(Task::ReplaceBackgroundAndRelight, |request| {
                request.background_prompt = non_empty(arg);
            }),
        };
    }

    if let Some(action) = find_action(&command, SPLIT_ARG_COMMANDS) {
        return split_arg_command(action, arg);
    }

    if find_action(&command, SINGLE_PATH_COMMANDS).is_some() {
        return ChatCommand::UseImage {
            path: parse_single_path_arg(arg),
        };
    }

    ChatCommand::Unknown {
        command,
        arg: arg.to_string(),
    }
}
