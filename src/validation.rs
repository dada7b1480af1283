//! Input validation for values stored on accounts.

use regex::Regex;
use std::sync::LazyLock;

// Local part, "@", then a dotted domain. Not RFC 5322 complete.
static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$").unwrap()
});

const MAX_LABEL_LEN: usize = 63;

/// Validate an email address. Returns the trimmed address when it is
/// acceptable.
pub fn email(email: &str) -> Option<&str> {
    let email = email.trim();
    if !RE_EMAIL.is_match(email) {
        return None;
    }

    let (_, domain) = email.rsplit_once('@')?;
    if domain.split('.').any(|label| label.len() > MAX_LABEL_LEN) {
        return None;
    }

    Some(email)
}

/// Subject length does not exceed `max` bytes.
pub fn max_len(subject: &str, max: usize) -> bool {
    subject.len() <= max
}
