//! Chat/voice command grammar.
//!
//! Commands arrive as free-form text ("move forward for 5 seconds") and map
//! to the robot's single-character codes. Matching is deliberately forgiving:
//! a known phrase anywhere in the message wins, then a two-word prefix, then
//! the first word alone.

/// Single-character codes understood by the robot firmware.
pub const DEVICE_CODES: [char; 5] = ['F', 'B', 'L', 'R', 'S'];

pub const STOP_CODE: char = 'S';

const COMMANDS: [(&str, char); 5] = [
    ("move forward", 'F'),
    ("move backward", 'B'),
    ("turn left", 'L'),
    ("turn right", 'R'),
    ("stop", 'S'),
];

/// A recognized chat command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub phrase: String,
    pub code: char,
    pub duration_secs: u64,
}

/// Parse a free-form message into a device command plus an optional duration
/// ("... for N seconds"). Returns `None` when nothing matches the table.
pub fn parse_message(message: &str) -> Option<ParsedCommand> {
    let message = message.to_lowercase();
    let parts: Vec<&str> = message.split_whitespace().collect();

    let mut duration_secs = 0;
    for (i, word) in parts.iter().enumerate() {
        if !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()) {
            if let Some(next) = parts.get(i + 1) {
                if *next == "second" || *next == "seconds" {
                    duration_secs = word.parse().unwrap_or(0);
                }
            }
        }
    }

    let mut phrase = COMMANDS
        .iter()
        .find(|(key, _)| message.contains(key))
        .map(|(key, _)| key.to_string());
    if phrase.is_none() {
        if parts.len() > 1 {
            phrase = Some(format!("{} {}", parts[0], parts[1]));
        } else if let Some(first) = parts.first() {
            phrase = Some(first.to_string());
        }
    }

    let phrase = phrase?;
    let code = COMMANDS
        .iter()
        .find(|(key, _)| *key == phrase)
        .map(|(_, code)| *code)?;

    Some(ParsedCommand {
        phrase,
        code,
        duration_secs,
    })
}

/// Validate a raw single-character command as sent by the control buttons.
pub fn device_code(raw: &str) -> Option<char> {
    let trimmed = raw.trim().to_ascii_uppercase();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(code), None) if DEVICE_CODES.contains(&code) => Some(code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrase_with_duration_is_parsed() {
        let cmd = parse_message("move forward for 5 seconds").unwrap();
        assert_eq!(cmd.code, 'F');
        assert_eq!(cmd.phrase, "move forward");
        assert_eq!(cmd.duration_secs, 5);
    }

    #[test]
    fn phrase_match_works_anywhere_in_the_message() {
        let cmd = parse_message("please turn left now").unwrap();
        assert_eq!(cmd.code, 'L');
        assert_eq!(cmd.duration_secs, 0);
    }

    #[test]
    fn singular_second_also_counts() {
        let cmd = parse_message("move backward for 1 second").unwrap();
        assert_eq!(cmd.code, 'B');
        assert_eq!(cmd.duration_secs, 1);
    }

    #[test]
    fn number_without_seconds_unit_is_ignored() {
        let cmd = parse_message("move forward for 5").unwrap();
        assert_eq!(cmd.code, 'F');
        assert_eq!(cmd.duration_secs, 0);
    }

    #[test]
    fn stop_is_recognized() {
        assert_eq!(parse_message("stop").unwrap().code, 'S');
    }

    #[test]
    fn unknown_messages_are_rejected() {
        assert!(parse_message("dance for me").is_none());
        assert!(parse_message("").is_none());
    }

    #[test]
    fn case_is_irrelevant() {
        assert_eq!(parse_message("Turn Right").unwrap().code, 'R');
    }

    #[test]
    fn raw_codes_are_validated() {
        assert_eq!(device_code("F"), Some('F'));
        assert_eq!(device_code(" s "), Some('S'));
        assert_eq!(device_code("X"), None);
        assert_eq!(device_code("FF"), None);
        assert_eq!(device_code(""), None);
    }
}
