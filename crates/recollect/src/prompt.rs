//! System prompt assembly

/// Placeholder a persona may contain to position the memory narrative
pub const MEMORY_PLACEHOLDER: &str = "{memory_context}";

/// Build the system prompt for one exchange.
///
/// A persona containing `{memory_context}` gets the narrative substituted in
/// place. Otherwise a reference block is appended, unless the narrative is
/// the no-memories placeholder.
pub fn build_system_prompt(persona: &str, narrative: &str, placeholder: &str) -> String {
    if persona.contains(MEMORY_PLACEHOLDER) {
        return persona.replace(MEMORY_PLACEHOLDER, narrative);
    }

    if narrative.trim().is_empty() || narrative == placeholder {
        return persona.to_string();
    }

    format!(
        "{persona}\n\n\
         Long-term memory reference (from earlier conversations):\n\
         {narrative}\n\n\
         Use these memories when answering. If they mention the user's name, \
         preferences or other personal details, remember and use them."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACEHOLDER: &str = "(no memories)";

    #[test]
    fn test_placeholder_is_substituted() {
        let prompt = build_system_prompt(
            "You are kind. Memories: {memory_context}",
            "I remember coffee.",
            PLACEHOLDER,
        );
        assert_eq!(prompt, "You are kind. Memories: I remember coffee.");
    }

    #[test]
    fn test_substitution_keeps_no_memories_placeholder() {
        let prompt = build_system_prompt("Known: {memory_context}", PLACEHOLDER, PLACEHOLDER);
        assert_eq!(prompt, "Known: (no memories)");
    }

    #[test]
    fn test_reference_block_appended() {
        let prompt = build_system_prompt("You are kind.", "I remember coffee.", PLACEHOLDER);
        assert!(prompt.starts_with("You are kind.\n\nLong-term memory reference"));
        assert!(prompt.contains("\nI remember coffee.\n\n"));
    }

    #[test]
    fn test_nothing_appended_without_memories() {
        assert_eq!(
            build_system_prompt("You are kind.", PLACEHOLDER, PLACEHOLDER),
            "You are kind."
        );
        assert_eq!(build_system_prompt("You are kind.", "", PLACEHOLDER), "You are kind.");
    }
}
