//! Escaping and formatting helpers shared by every rendering path.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::price::CurrencyCode;

/// Escape text for inclusion in HTML element content or a quoted attribute.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Accept only `http(s)` and site-relative URLs; anything else becomes `#`.
///
/// Product images and redirect targets come from the API and end up in
/// `href`/`src` attributes.
#[must_use]
pub fn sanitize_url(input: &str) -> &str {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("https://")
        || lower.starts_with("http://")
        || (trimmed.starts_with('/') && !trimmed.starts_with("//"))
    {
        trimmed
    } else {
        "#"
    }
}

/// Format an amount in the default currency, e.g. `$1,234.50`.
#[must_use]
pub fn format_price(amount: Decimal) -> String {
    format_amount(amount, CurrencyCode::default())
}

/// Format an amount with thousands separators and two decimals.
#[must_use]
pub fn format_amount(amount: Decimal, currency: CurrencyCode) -> String {
    let rounded = amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .abs();
    let text = format!("{rounded:.2}");
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{}{grouped}.{cents}", currency.symbol())
}

/// Progress towards the free-shipping threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingProgress {
    /// Amount still needed; zero once qualified.
    pub remaining: Decimal,
    /// Whole-number percentage, clamped to 0..=100.
    pub percent: u8,
}

impl ShippingProgress {
    /// Compute progress for `subtotal` against `threshold`.
    #[must_use]
    pub fn compute(subtotal: Decimal, threshold: Decimal) -> Self {
        if threshold <= Decimal::ZERO || subtotal >= threshold {
            return Self {
                remaining: Decimal::ZERO,
                percent: 100,
            };
        }
        let subtotal = subtotal.max(Decimal::ZERO);
        let ratio = (subtotal / threshold * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::ToZero);
        let percent = ratio.to_u8().unwrap_or(100).min(100);
        Self {
            remaining: threshold - subtotal,
            percent,
        }
    }

    /// Whether the subtotal already qualifies.
    #[must_use]
    pub fn qualifies(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Banner text, e.g. "Add $5.00 more for FREE shipping".
    #[must_use]
    pub fn message(&self) -> String {
        if self.qualifies() {
            "You qualify for FREE shipping!".to_string()
        } else {
            format!("Add {} more for FREE shipping", format_price(self.remaining))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<img src=x onerror="alert('1')">&"#),
            "&lt;img src=x onerror=&quot;alert(&#39;1&#39;)&quot;&gt;&amp;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_sanitize_url() {
        assert_eq!(sanitize_url("https://cdn.example.com/a.png"), "https://cdn.example.com/a.png");
        assert_eq!(sanitize_url("/images/a.png"), "/images/a.png");
        assert_eq!(sanitize_url("javascript:alert(1)"), "#");
        assert_eq!(sanitize_url("//evil.example"), "#");
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(Decimal::new(5, 0)), "$5.00");
        assert_eq!(format_price(Decimal::new(123_456_789, 2)), "$1,234,567.89");
        assert_eq!(format_price(Decimal::new(-1050, 2)), "-$10.50");
        assert_eq!(format_price(Decimal::new(1005, 3)), "$1.01");
        assert_eq!(format_price(Decimal::ZERO), "$0.00");
        assert_eq!(format_price(Decimal::new(99_999, 2)), "$999.99");
    }

    #[test]
    fn test_shipping_progress_95_of_100() {
        let progress = ShippingProgress::compute(Decimal::new(95, 0), Decimal::new(100, 0));
        assert_eq!(progress.percent, 95);
        assert_eq!(progress.remaining, Decimal::new(5, 0));
        assert_eq!(progress.message(), "Add $5.00 more for FREE shipping");
    }

    #[test]
    fn test_shipping_progress_qualified() {
        let progress = ShippingProgress::compute(Decimal::new(120, 0), Decimal::new(100, 0));
        assert!(progress.qualifies());
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.message(), "You qualify for FREE shipping!");
    }

    #[test]
    fn test_shipping_progress_rounds_down() {
        let progress = ShippingProgress::compute(Decimal::new(9999, 2), Decimal::new(100, 0));
        assert_eq!(progress.percent, 99);
        assert_eq!(progress.message(), "Add $0.01 more for FREE shipping");
    }
}
