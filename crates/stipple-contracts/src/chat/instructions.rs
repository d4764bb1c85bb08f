use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    CreateImage,
    ModifyImage,
}

#[derive(Debug, Clone, Copy)]
pub struct InstructionPattern {
    pub phrase: &'static str,
    pub kind: InstructionKind,
}

/// Checked in order; the first phrase contained in the instruction wins.
pub const INSTRUCTION_VOCABULARY: &[InstructionPattern] = &[
    InstructionPattern {
        phrase: "create image",
        kind: InstructionKind::CreateImage,
    },
    InstructionPattern {
        phrase: "modify image",
        kind: InstructionKind::ModifyImage,
    },
];

pub fn match_instruction(text: &str) -> GatewayResult<InstructionKind> {
    match_instruction_in(text, INSTRUCTION_VOCABULARY)
        .ok_or_else(|| GatewayError::UnrecognizedInstruction(text.trim().to_string()))
}

pub fn match_instruction_in(text: &str, vocabulary: &[InstructionPattern]) -> Option<InstructionKind> {
    let lowered = text.to_lowercase();
    vocabulary
        .iter()
        .find(|pattern| lowered.contains(pattern.phrase))
        .map(|pattern| pattern.kind)
}
