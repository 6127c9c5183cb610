//! Parser for the session manager's listing output.
//!
//! Expected entry format (one per line, tab indented):
//! `<pid>.<name>\t[(<date>)\t](<state>)`

/// Attach state reported for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Attached,
    Detached,
    Other(String),
}

/// One session from the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub pid: u32,
    pub name: String,
    pub state: SessionState,
}

/// Parse every recognisable entry of a listing; headers and footers are
/// skipped.
pub fn parse_listing(output: &str) -> Vec<SessionEntry> {
    output.lines().filter_map(parse_entry).collect()
}

fn parse_entry(line: &str) -> Option<SessionEntry> {
    let line = line.trim();
    let first = line.split_whitespace().next()?;
    let (pid, name) = first.split_once('.')?;
    if pid.is_empty() || name.is_empty() {
        return None;
    }
    let pid = pid.parse::<u32>().ok()?;

    let state = line
        .rsplit('(')
        .next()
        .and_then(|s| s.strip_suffix(')'))
        .map(|s| match s {
            "Attached" => SessionState::Attached,
            "Detached" => SessionState::Detached,
            other => SessionState::Other(other.to_string()),
        })
        .unwrap_or_else(|| SessionState::Other(String::new()));

    Some(SessionEntry {
        pid,
        name: name.to_string(),
        state,
    })
}

/// True when the listing names a session called `name`.
///
/// Parsed entries must match exactly. Lines that do not parse fall back to
/// the `<digits>.<name>` substring pattern.
pub fn listing_contains(output: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    output.lines().any(|line| match parse_entry(line) {
        Some(entry) => entry.name == name,
        None => matches_pid_pattern(line, name),
    })
}

fn matches_pid_pattern(line: &str, name: &str) -> bool {
    let needle = format!(".{}", name);
    line.match_indices(&needle).any(|(idx, _)| {
        line[..idx]
            .chars()
            .next_back()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "There are screens on:\n\
        \t12345.sensors\t(Detached)\n\
        \t678.pts-0.pi\t(10/19/2026 09:12:01 AM)\t(Attached)\n\
        2 Sockets in /run/screen/S-pi.\n";

    #[test]
    fn test_parse_listing() {
        let entries = parse_listing(LISTING);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pid, 12345);
        assert_eq!(entries[0].name, "sensors");
        assert_eq!(entries[0].state, SessionState::Detached);
        assert_eq!(entries[1].name, "pts-0.pi");
        assert_eq!(entries[1].state, SessionState::Attached);
    }

    #[test]
    fn test_contains_exact_name_only() {
        assert!(listing_contains(LISTING, "sensors"));
        assert!(listing_contains(LISTING, "pts-0.pi"));
        assert!(!listing_contains(LISTING, "sensor"));
        assert!(!listing_contains(LISTING, ""));
    }

    #[test]
    fn test_empty_listing() {
        let text = "No Sockets found in /run/screen/S-pi.\n";
        assert!(parse_listing(text).is_empty());
        assert!(!listing_contains(text, "sensors"));
    }

    #[test]
    fn test_fallback_pattern_on_unparsed_line() {
        let text = "socket: 4242.sensors-main attached\n";
        assert!(listing_contains("  (4242.sensors)", "sensors"));
        assert!(listing_contains(text, "sensors"));
        assert!(!listing_contains("x.sensors", "sensors"));
    }
}
