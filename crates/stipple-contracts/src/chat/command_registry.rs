#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChatAction {
    Help,
    Quit,
    Current,
    UseImage,
    Generate,
    RemoveBackground,
    Recolor,
    SearchAndReplace,
    Outpaint,
    Relight,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: ChatAction,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: ChatAction::Help,
    },
    CommandSpec {
        command: "quit",
        action: ChatAction::Quit,
    },
    CommandSpec {
        command: "exit",
        action: ChatAction::Quit,
    },
    CommandSpec {
        command: "current",
        action: ChatAction::Current,
    },
    CommandSpec {
        command: "remove_background",
        action: ChatAction::RemoveBackground,
    },
];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: ChatAction::Generate,
    },
    CommandSpec {
        command: "recolor",
        action: ChatAction::Recolor,
    },
    CommandSpec {
        command: "relight",
        action: ChatAction::Relight,
    },
    CommandSpec {
        command: "replace_background_and_relight",
        action: ChatAction::Relight,
    },
];

pub(crate) const SPLIT_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "search_and_replace",
        action: ChatAction::SearchAndReplace,
    },
    CommandSpec {
        command: "outpaint",
        action: ChatAction::Outpaint,
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "use",
    action: ChatAction::UseImage,
}];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/generate",
    "/remove_background",
    "/recolor",
    "/search_and_replace",
    "/outpaint",
    "/relight",
    "/use",
    "/current",
    "/quit",
];
