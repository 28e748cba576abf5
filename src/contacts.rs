use std::collections::HashMap;

/// Number of trailing digits compared when numbers differ in formatting or
/// country prefix.
const MIN_MATCH_DIGITS: usize = 7;

/// Best-effort phone number to display name lookup.
pub trait ContactResolver: Send + Sync {
    fn resolve(&self, phone_number: &str) -> Option<String>;
}

/// Contacts loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct ContactBook {
    entries: Vec<(String, String)>,
}

impl ContactBook {
    pub fn new(contacts: &HashMap<String, String>) -> Self {
        let entries = contacts
            .iter()
            .filter(|(number, name)| !number.trim().is_empty() && !name.trim().is_empty())
            .map(|(number, name)| (normalize_phone_number(number), name.trim().to_string()))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContactResolver for ContactBook {
    fn resolve(&self, phone_number: &str) -> Option<String> {
        let normalized = normalize_phone_number(phone_number);
        if normalized.is_empty() {
            return None;
        }

        // Exact match wins over a loose trailing-digit match
        if let Some((_, name)) = self.entries.iter().find(|(number, _)| *number == normalized) {
            return Some(name.clone());
        }

        self.entries
            .iter()
            .find(|(number, _)| numbers_match(number, &normalized))
            .map(|(_, name)| name.clone())
    }
}

/// Strip everything except digits and `+`.
pub fn normalize_phone_number(phone_number: &str) -> String {
    phone_number
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Loose comparison: equal after normalization, or the same trailing
/// [`MIN_MATCH_DIGITS`] digits.
pub fn numbers_match(a: &str, b: &str) -> bool {
    let a = normalize_phone_number(a);
    let b = normalize_phone_number(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }

    let a_digits: Vec<char> = a.chars().filter(|c| c.is_ascii_digit()).collect();
    let b_digits: Vec<char> = b.chars().filter(|c| c.is_ascii_digit()).collect();
    if a_digits.len() < MIN_MATCH_DIGITS || b_digits.len() < MIN_MATCH_DIGITS {
        return false;
    }
    a_digits[a_digits.len() - MIN_MATCH_DIGITS..] == b_digits[b_digits.len() - MIN_MATCH_DIGITS..]
}

/// Contact name for `sender`, the raw sender when unknown, `"Unknown"` when absent.
pub fn display_name(resolver: &dyn ContactResolver, sender: Option<&str>) -> String {
    match sender {
        Some(sender) if !sender.is_empty() => resolver
            .resolve(sender)
            .unwrap_or_else(|| sender.to_string()),
        _ => "Unknown".to_string(),
    }
}
