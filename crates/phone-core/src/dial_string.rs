//! Dial string helpers

/// `,` pauses post-dial processing for a fixed delay
pub const PAUSE: char = ',';
/// `;` waits for the user to proceed
pub const WAIT: char = ';';
/// `N` waits for the user to supply digits
pub const WILD: char = 'N';

fn is_dialable(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '*' | '#' | '+' | PAUSE | WAIT | WILD)
}

fn is_post_dial_break(c: char) -> bool {
    matches!(c, PAUSE | WAIT | WILD)
}

/// Remove visual separators, keeping only dialable characters.
///
/// `p` and `w` are accepted as aliases for pause and wait.
pub fn strip_separators(dial_string: &str) -> String {
    dial_string
        .chars()
        .filter_map(|c| match c {
            'p' | 'P' => Some(PAUSE),
            'w' | 'W' => Some(WAIT),
            c if is_dialable(c) => Some(c),
            _ => None,
        })
        .collect()
}

/// Part of the dial string sent to the network
pub fn network_portion(dial_string: &str) -> &str {
    match dial_string.find(is_post_dial_break) {
        Some(idx) => &dial_string[..idx],
        None => dial_string,
    }
}

/// Part of the dial string processed after the call connects
pub fn post_dial_portion(dial_string: &str) -> &str {
    match dial_string.find(is_post_dial_break) {
        Some(idx) => &dial_string[idx..],
        None => "",
    }
}

/// Whether `number` exactly matches one of the configured emergency numbers
pub fn is_emergency(number: &str, emergency_numbers: &[String]) -> bool {
    let network = network_portion(number);
    !network.is_empty() && emergency_numbers.iter().any(|e| e == network)
}

/// Twelve-key DTMF character
pub fn is_dtmf(c: char) -> bool {
    c.is_ascii_digit() || c == '*' || c == '#'
}

/// DTMF character accepted by start-DTMF, which also allows `A`-`D`
pub fn is_extended_dtmf(c: char) -> bool {
    is_dtmf(c) || matches!(c, 'A'..='D')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_and_split() {
        let stripped = strip_separators("+1 (650) 555-0100 p123w#");
        assert_eq!(stripped, "+16505550100,123;#");
        assert_eq!(network_portion(&stripped), "+16505550100");
        assert_eq!(post_dial_portion(&stripped), ",123;#");
        assert_eq!(post_dial_portion("911"), "");
    }

    #[test]
    fn test_emergency_match_is_exact() {
        let numbers = vec!["112".to_string(), "911".to_string()];
        assert!(is_emergency("911", &numbers));
        assert!(is_emergency("112,1", &numbers));
        assert!(!is_emergency("9110", &numbers));
        assert!(!is_emergency("", &numbers));
    }

    #[test]
    fn test_dtmf_sets() {
        assert!(is_dtmf('#'));
        assert!(!is_dtmf('A'));
        assert!(is_extended_dtmf('A'));
        assert!(!is_extended_dtmf('E'));
    }
}
