//! Policy line parsing

/// Split a policy line into its rule type and fields
///
/// Blank lines and `#` comments yield `None`.
pub fn parse_policy_line(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split(',').map(|t| t.trim().to_string());
    let ptype = tokens.next()?;
    Some((ptype, tokens.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_line() {
        let (ptype, fields) = parse_policy_line("p, alice, data1, read").unwrap();
        assert_eq!(ptype, "p");
        assert_eq!(fields, vec!["alice", "data1", "read"]);
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        assert!(parse_policy_line("").is_none());
        assert!(parse_policy_line("   ").is_none());
        assert!(parse_policy_line("# p, alice, data1, read").is_none());
    }

    #[test]
    fn test_parse_type_only_line() {
        let (ptype, fields) = parse_policy_line("g").unwrap();
        assert_eq!(ptype, "g");
        assert!(fields.is_empty());
    }
}
