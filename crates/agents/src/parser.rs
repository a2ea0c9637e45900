//! ReAct response parsing: pulls `Thought`/`Action`/`Action Input`/
//! `Final Answer` sections out of a free-text LLM reply, tolerating
//! duplicate headers and hallucinated continuations.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReActParseResult {
    pub thought: Option<String>,
    pub action: Option<String>,
    pub action_input: Option<String>,
    pub final_answer: Option<String>,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Thought,
    Action,
    ActionInput,
    FinalAnswer,
}

impl Section {
    fn key(self) -> &'static str {
        match self {
            Section::Thought => "thought",
            Section::Action => "action",
            Section::ActionInput => "action_input",
            Section::FinalAnswer => "final_answer",
        }
    }
}

/// Input that isn't a string parses to an all-`None`, incomplete result.
pub fn parse(input: Option<&str>) -> ReActParseResult {
    let Some(text) = input else {
        return ReActParseResult::default();
    };
    if text.is_empty() {
        return ReActParseResult::default();
    }

    let mut result = ReActParseResult::default();
    let mut found_sections: std::collections::HashSet<&'static str> = std::collections::HashSet::new();
    let mut current: Option<Section> = None;
    let mut buffer: Vec<&str> = Vec::new();

    macro_rules! finalize {
        () => {
            if let Some(section) = current.take() {
                finalize_section(&mut result, section, &buffer);
                buffer.clear();
            }
        };
    }

    for line in text.lines() {
        if should_stop_parsing(line) {
            break;
        }
        if let Some(section) = detect_header(line, &found_sections) {
            finalize!();
            found_sections.insert(section.key());
            current = Some(section);
            let content = extract_section_content(line, section);
            if !content.is_empty() {
                buffer.push(content);
            }
            continue;
        }
        if current.is_some() {
            buffer.push(line);
        }
    }
    finalize!();

    if result.final_answer.is_some() {
        result.is_complete = true;
    }
    result
}

fn finalize_section(result: &mut ReActParseResult, section: Section, lines: &[&str]) {
    let content = lines.join("\n").trim().to_string();
    let content = if content.is_empty() { None } else { Some(content) };
    match section {
        Section::Thought => result.thought = content,
        Section::Action => result.action = content,
        Section::ActionInput => result.action_input = content,
        // First Final Answer wins; later duplicates are rejected before
        // we ever get here (see `detect_header`'s found_sections check).
        Section::FinalAnswer => {
            if result.final_answer.is_none() {
                result.final_answer = content;
            }
        }
    }
}

fn header_prefix(section: Section) -> &'static str {
    match section {
        Section::Thought => "Thought",
        Section::Action => "Action",
        Section::ActionInput => "Action Input",
        Section::FinalAnswer => "Final Answer",
    }
}

fn detect_header(line: &str, found_sections: &std::collections::HashSet<&'static str>) -> Option<Section> {
    for section in [Section::FinalAnswer, Section::ActionInput, Section::Action, Section::Thought] {
        if is_section_header(line, section, found_sections) {
            return Some(section);
        }
    }
    None
}

/// A line is a header for `section` if it starts with the section's
/// name (optionally followed by a colon), case-sensitively. `Final
/// Answer` is rejected once it has already been seen once — first
/// occurrence wins, duplicates are ignored as headers (their text
/// falls into whatever section was open before them).
fn is_section_header(line: &str, section: Section, found_sections: &std::collections::HashSet<&'static str>) -> bool {
    if section == Section::FinalAnswer && found_sections.contains("final_answer") {
        return false;
    }
    let prefix = header_prefix(section);
    if let Some(rest) = line.strip_prefix(prefix) {
        rest.is_empty() || rest.starts_with(':')
    } else {
        false
    }
}

fn extract_section_content(line: &str, section: Section) -> &str {
    let prefix = header_prefix(section);
    let rest = line.strip_prefix(prefix).unwrap_or("");
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    rest.trim_start()
}

/// Stops parsing at lines that look like a hallucinated continuation
/// of the transcript: a fake `[Based on ...` marker, or an
/// `Observation:` line the model invented itself — except for the two
/// continuation-prompt `Observation:` lines *we* inject, which must
/// not be mistaken for hallucinated content.
fn should_stop_parsing(line: &str) -> bool {
    if line.starts_with("[Based on") {
        return true;
    }
    if let Some(rest) = line.strip_prefix("Observation:") {
        let _ = rest;
        return !line.contains("Please specify what Action") && !line.contains("Error in reasoning");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_parses_to_none() {
        let r = parse(Some(""));
        assert_eq!(r, ReActParseResult::default());
    }

    #[test]
    fn none_input_parses_to_none() {
        let r = parse(None);
        assert_eq!(r, ReActParseResult::default());
    }

    #[test]
    fn stops_at_hallucinated_observation() {
        let response = "Thought: I need to check the namespace status.\nAction: kubectl.get_namespace\nAction Input: name=test-namespace\n\nObservation: Based on the kubectl command, the namespace shows:\n{\"status\": \"Terminating\"}\n\nThought: I can see the issue is a stuck finalizer.";
        let r = parse(Some(response));
        assert_eq!(r.thought.as_deref(), Some("I need to check the namespace status."));
        assert_eq!(r.action.as_deref(), Some("kubectl.get_namespace"));
        assert_eq!(r.action_input.as_deref(), Some("name=test-namespace"));
        assert!(r.final_answer.is_none());
        assert!(!r.is_complete);
    }

    #[test]
    fn stops_at_fake_content_marker() {
        let response = "Thought: Need to investigate the alert.\nAction: test.action\nAction Input: param=value\n\n[Based on the investigation, I found that...]\n\nThought: This shouldn't be parsed.";
        let r = parse(Some(response));
        assert_eq!(r.thought.as_deref(), Some("Need to investigate the alert."));
        assert_eq!(r.action.as_deref(), Some("test.action"));
        assert_eq!(r.action_input.as_deref(), Some("param=value"));
    }

    #[test]
    fn only_first_final_answer_is_used() {
        let response = "Thought: Analysis complete.\n\nFinal Answer: First analysis result.\n\nFinal Answer: This second one should be ignored.";
        let r = parse(Some(response));
        assert!(r.final_answer.as_deref().unwrap().contains("First analysis result"));
        assert!(r.is_complete);
    }

    #[test]
    fn latest_action_wins_over_duplicates() {
        let response = "Thought: First thought.\nAction: first.action\nAction Input: first=input\n\nThought: Changed my mind.\nAction: second.action\nAction Input: second=input";
        let r = parse(Some(response));
        assert_eq!(r.action.as_deref(), Some("second.action"));
        assert_eq!(r.action_input.as_deref(), Some("second=input"));
        assert_eq!(r.thought.as_deref(), Some("Changed my mind."));
    }

    #[test]
    fn thought_only_multiline_response() {
        let response = "Thought\nI need to analyze this situation carefully.\nThis is multi-line thinking.";
        let r = parse(Some(response));
        assert_eq!(r.thought.as_deref(), Some("I need to analyze this situation carefully.\nThis is multi-line thinking."));
        assert!(r.action.is_none());
        assert!(r.final_answer.is_none());
    }

    #[test]
    fn continuation_observations_do_not_stop_parsing() {
        let response = "Thought: retry.\nObservation: Please specify what Action to take next.\nAction: test.action\nAction Input: x=1";
        let r = parse(Some(response));
        assert_eq!(r.action.as_deref(), Some("test.action"));
    }
}
