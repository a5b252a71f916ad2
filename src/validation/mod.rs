/// Input normalisation shared by the API and the webhook
///
/// Phone numbers are stored in E.164 form so that inbound WhatsApp senders
/// (`whatsapp:+447700900123`) match the numbers accountants type in.
use crate::error::{ChaseError, ChaseResult};

/// Country code assumed for numbers written in national format
pub const DEFAULT_COUNTRY_CODE: &str = "44";

/// Normalise a phone number to E.164 (`+` followed by 8-15 digits)
///
/// Accepts spaces, dashes, dots and parentheses, a `whatsapp:` prefix, a `00`
/// international prefix, and UK-style national numbers with a leading `0`.
pub fn normalize_phone(input: &str) -> ChaseResult<String> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix("whatsapp:").unwrap_or(trimmed).trim();

    let has_plus = trimmed.starts_with('+');
    let mut digits = String::with_capacity(trimmed.len());

    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            '+' if i == 0 => {}
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(ChaseError::Validation(format!(
                    "Invalid character in phone number: {}",
                    input
                )))
            }
        }
    }

    let international = if has_plus {
        digits
    } else if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", DEFAULT_COUNTRY_CODE, rest)
    } else {
        digits
    };

    if !(8..=15).contains(&international.len()) || international.starts_with('0') {
        return Err(ChaseError::Validation(format!("Invalid phone number: {}", input)));
    }

    Ok(format!("+{}", international))
}

/// Format a stored E.164 number as a Twilio WhatsApp address
pub fn whatsapp_address(phone: &str) -> String {
    if phone.starts_with("whatsapp:") {
        phone.to_string()
    } else {
        format!("whatsapp:{}", phone)
    }
}

/// Lowercase ASCII slug with single hyphens (for blog posts)
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_hyphen = true;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

/// Whether a slug is already in canonical form
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_international() {
        assert_eq!(normalize_phone("+44 7700 900123").unwrap(), "+447700900123");
        assert_eq!(normalize_phone("whatsapp:+447700900123").unwrap(), "+447700900123");
        assert_eq!(normalize_phone("0044 (7700) 900-123").unwrap(), "+447700900123");
        assert_eq!(normalize_phone("+1 415.555.0100").unwrap(), "+14155550100");
    }

    #[test]
    fn test_normalize_national_uses_default_country() {
        assert_eq!(normalize_phone("07700 900123").unwrap(), "+447700900123");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("+44 7700 9001234567890").is_err());
        assert!(normalize_phone("call me maybe").is_err());
        assert!(normalize_phone("+44+7700900123").is_err());
    }

    #[test]
    fn test_whatsapp_address() {
        assert_eq!(whatsapp_address("+447700900123"), "whatsapp:+447700900123");
        assert_eq!(whatsapp_address("whatsapp:+1555"), "whatsapp:+1555");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Year-End: 5 Documents You Need!"), "year-end-5-documents-you-need");
        assert_eq!(slugify("  --Hello   World--  "), "hello-world");
        assert!(is_valid_slug("tax-year-2024"));
        assert!(!is_valid_slug("Tax Year"));
        assert!(!is_valid_slug(""));
    }
}
