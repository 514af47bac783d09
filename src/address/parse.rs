//! Address syntax helpers (RFC 5322 §3.4).
//!
//! Addresses travel through the pipeline in internal (unquoted) form and are
//! quoted back to external form only when synthesized into a header.

/// Split an address into local part and domain at the last unquoted `@`.
pub fn split_address(address: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    let mut at = None;
    for (i, ch) in address.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '@' if !in_quotes => at = Some(i),
            _ => {}
        }
    }
    match at {
        Some(i) => (&address[..i], Some(&address[i + 1..])),
        None => (address, None),
    }
}

/// Split `user+ext` into `(user, Some(ext))`, or `(local, None)` when no
/// extension delimiter is present. A leading `+` is not a delimiter.
pub fn split_extension(local: &str) -> (&str, Option<&str>) {
    if local.len() < 2 {
        return (local, None);
    }
    match local[1..].find('+') {
        Some(i) => (&local[..i + 1], Some(&local[i + 2..])),
        None => (local, None),
    }
}

/// Case-folded key for duplicate filtering and table lookups.
pub fn normalize_key(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Quote the local part for external (header) form when it contains
/// characters outside the RFC 5322 atom set.
pub fn quote_822_local(address: &str) -> String {
    let (local, domain) = split_address(address);
    if local.is_empty() || local.chars().all(is_atom_char) {
        return address.to_string();
    }
    let escaped = local.replace('\\', "\\\\").replace('"', "\\\"");
    match domain {
        Some(domain) => format!("\"{escaped}\"@{domain}"),
        None => format!("\"{escaped}\""),
    }
}

/// Strip RFC 5322 local-part quoting, producing internal form.
pub fn unquote_822_local(address: &str) -> String {
    let (local, domain) = split_address(address);
    let local = local.trim();
    let unquoted = if local.len() >= 2 && local.starts_with('"') && local.ends_with('"') {
        let mut out = String::with_capacity(local.len() - 2);
        let mut escaped = false;
        for ch in local[1..local.len() - 1].chars() {
            if escaped {
                out.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else {
                out.push(ch);
            }
        }
        out
    } else {
        local.to_string()
    };
    match domain {
        Some(domain) => format!("{unquoted}@{domain}"),
        None => unquoted,
    }
}

fn is_atom_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(ch)
}

/// Extract bare addresses from a structured header value.
///
/// Supported forms, comma-separated:
/// - `user@domain.com`
/// - `<user@domain.com>`
/// - `Display Name <user@domain.com>`
/// - `"Last, First" <user@domain.com>`
///
/// Group syntax (`name:;`) yields no addresses. A non-address token without
/// an angle form is returned as-is so the rewriting oracle can qualify it.
pub fn extract_addresses(value: &str) -> Vec<String> {
    let mut results = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                if let Some(addr) = extract_one(&current) {
                    results.push(addr);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if let Some(addr) = extract_one(&current) {
        results.push(addr);
    }
    results
}

/// Rewrite every address in a structured header value, preserving display
/// names and group syntax. Elements are re-joined with `", "`; folding
/// whitespace inside the value collapses, the output service re-folds
/// overlong results.
pub fn rewrite_header_value(value: &str, rewrite: &mut dyn FnMut(&str) -> String) -> String {
    let mut elements: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    let mut flush = |element: &str, elements: &mut Vec<String>| {
        let trimmed = element.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            return;
        }
        if trimmed.ends_with(":;") {
            elements.push(trimmed);
            return;
        }
        if let (Some(start), Some(end)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if end > start {
                let addr = trimmed[start + 1..end].trim();
                if addr.is_empty() {
                    elements.push(trimmed);
                } else {
                    let prefix = trimmed[..start].trim_end();
                    let rewritten = rewrite(addr);
                    if prefix.is_empty() {
                        elements.push(format!("<{rewritten}>"));
                    } else {
                        elements.push(format!("{prefix} <{rewritten}>"));
                    }
                }
                return;
            }
        }
        elements.push(rewrite(&trimmed));
    };

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                flush(&current, &mut elements);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    flush(&current, &mut elements);
    elements.join(", ")
}

/// Pull the bare address out of one list element.
fn extract_one(element: &str) -> Option<String> {
    let trimmed = element.trim();
    if trimmed.is_empty() || trimmed.ends_with(":;") {
        return None;
    }
    if let Some(angle_start) = trimmed.rfind('<') {
        if let Some(angle_end) = trimmed.rfind('>') {
            if angle_end > angle_start {
                let addr = trimmed[angle_start + 1..angle_end].trim();
                if addr.is_empty() {
                    return None;
                }
                return Some(addr.to_string());
            }
        }
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_address() {
        assert_eq!(split_address("user@example.com"), ("user", Some("example.com")));
        assert_eq!(split_address("user"), ("user", None));
        assert_eq!(
            split_address("\"odd@name\"@example.com"),
            ("\"odd@name\"", Some("example.com"))
        );
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("user+tag"), ("user", Some("tag")));
        assert_eq!(split_extension("user"), ("user", None));
        assert_eq!(split_extension("+user"), ("+user", None));
    }

    #[test]
    fn test_quote_unquote_round_trip() {
        let internal = "odd name@example.com";
        let external = quote_822_local(internal);
        assert_eq!(external, "\"odd name\"@example.com");
        assert_eq!(unquote_822_local(&external), internal);
    }

    #[test]
    fn test_quote_plain_address_unchanged() {
        assert_eq!(quote_822_local("user@example.com"), "user@example.com");
    }

    #[test]
    fn test_extract_addresses() {
        let list = extract_addresses("User One <a@b.com>, \"Last, First\" <c@d.com>, plain@e.com");
        assert_eq!(list, vec!["a@b.com", "c@d.com", "plain@e.com"]);
    }

    #[test]
    fn test_extract_group_syntax_empty() {
        assert!(extract_addresses("undisclosed-recipients:;").is_empty());
    }

    #[test]
    fn test_rewrite_header_value_preserves_display_names() {
        let rewritten = rewrite_header_value("User One <alice>, bob", &mut |addr| {
            format!("{addr}@example.com")
        });
        assert_eq!(rewritten, "User One <alice@example.com>, bob@example.com");
    }

    #[test]
    fn test_rewrite_header_value_keeps_group_syntax() {
        let rewritten =
            rewrite_header_value("undisclosed-recipients:;", &mut |addr| addr.to_string());
        assert_eq!(rewritten, "undisclosed-recipients:;");
    }

    #[test]
    fn test_rewrite_header_value_collapses_folding() {
        let rewritten = rewrite_header_value("Alice\n <a@b.com>,\n c@d.com", &mut |addr| {
            addr.to_string()
        });
        assert_eq!(rewritten, "Alice <a@b.com>, c@d.com");
    }

    #[test]
    fn test_normalize_key_folds_case() {
        assert_eq!(normalize_key(" Alice@Example.COM "), "alice@example.com");
    }
}
