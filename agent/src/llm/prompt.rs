use crate::llm::Message;

/// Returns the tail of `history` holding at most the last `max_pairs` turns.
///
/// A turn starts at a user message and runs until the next one, so tool
/// results stay attached to the request that produced them. System messages
/// are not part of the conversation and are dropped.
pub fn window(history: &[Message], max_pairs: usize) -> Vec<Message> {
    let conversation = history
        .iter()
        .filter(|m| !matches!(m, Message::System(_)))
        .collect::<Vec<_>>();

    let turn_starts = conversation
        .iter()
        .enumerate()
        .filter(|(_, m)| matches!(m, Message::User(_)))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let skip = turn_starts.len().saturating_sub(max_pairs);
    let start = match skip {
        0 => 0,
        _ => turn_starts.get(skip).copied().unwrap_or(conversation.len()),
    };

    conversation[start..].iter().map(|m| (*m).clone()).collect()
}

/// Renders messages into a single prompt for completion-style backends.
pub fn format_prompt(messages: &[Message]) -> String {
    let mut parts = Vec::new();

    let system = messages
        .iter()
        .filter_map(|m| match m {
            Message::System(text) => Some(text.trim()),
            _ => None,
        })
        .collect::<Vec<_>>();
    if !system.is_empty() {
        parts.push(system.join("\n\n"));
        parts.push(String::new());
    }

    for message in messages {
        match message {
            Message::System(_) => {}
            Message::User(text) => parts.push(format!("User: {}", text)),
            Message::Assistant(text) => parts.push(format!("Agent: {}", text)),
            Message::Tool { name, result } => {
                parts.push(format!("Tool result ({}): {}", name, result))
            }
        }
    }

    parts.push("Agent:".to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{format_prompt, window};
    use crate::llm::Message;

    fn conversation(turns: usize) -> Vec<Message> {
        (0..turns)
            .flat_map(|i| {
                [
                    Message::User(format!("question {}", i)),
                    Message::Assistant(format!("answer {}", i)),
                ]
            })
            .collect()
    }

    #[test]
    fn test_window_keeps_last_pairs() {
        let history = conversation(10);
        let kept = window(&history, 6);

        assert_eq!(kept.len(), 12);
        assert_eq!(kept[0], Message::User("question 4".to_string()));
        assert_eq!(kept[11], Message::Assistant("answer 9".to_string()));
    }

    #[test]
    fn test_window_short_history_untouched() {
        let mut history = conversation(2);
        history.push(Message::User("pending".to_string()));

        assert_eq!(window(&history, 6), history);
    }

    #[test]
    fn test_window_counts_pending_user_message() {
        let mut history = conversation(3);
        history.push(Message::User("pending".to_string()));

        let kept = window(&history, 2);
        assert_eq!(
            kept,
            vec![
                Message::User("question 2".to_string()),
                Message::Assistant("answer 2".to_string()),
                Message::User("pending".to_string()),
            ]
        );
    }

    #[test]
    fn test_window_keeps_tool_results_with_turn() {
        let history = vec![
            Message::System("rules".to_string()),
            Message::User("weather?".to_string()),
            Message::Tool {
                name: "get_weather".to_string(),
                result: "sunny".to_string(),
            },
            Message::Assistant("It is sunny.".to_string()),
            Message::User("thanks".to_string()),
        ];

        let kept = window(&history, 2);
        assert_eq!(kept, history[1..].to_vec());
        assert_eq!(window(&history, 1), vec![Message::User("thanks".to_string())]);
        assert!(window(&history, 0).is_empty());
    }

    #[test]
    fn test_format_prompt() {
        let prompt = format_prompt(&[
            Message::System("  Be brief.  ".to_string()),
            Message::User("hola".to_string()),
            Message::Assistant("hi".to_string()),
            Message::Tool {
                name: "get_weather".to_string(),
                result: "sunny".to_string(),
            },
            Message::User("thanks".to_string()),
        ]);

        assert_eq!(
            prompt,
            "Be brief.\n\nUser: hola\nAgent: hi\nTool result (get_weather): sunny\nUser: thanks\nAgent:"
        );
    }

    #[test]
    fn test_format_prompt_without_system() {
        assert_eq!(
            format_prompt(&[Message::User("hi".to_string())]),
            "User: hi\nAgent:"
        );
    }
}
