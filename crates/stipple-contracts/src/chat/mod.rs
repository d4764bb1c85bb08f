mod command_registry;
mod instructions;
mod intent_parser;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use instructions::{
    match_instruction, match_instruction_in, InstructionKind, InstructionPattern,
    INSTRUCTION_VOCABULARY,
};
pub use intent_parser::{parse_chat_line, ChatCommand};
