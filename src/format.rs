use ethers_core::types::U256;
use rust_decimal::{Decimal, RoundingStrategy};

/// Renders a smallest-unit integer amount as a decimal string, e.g.
/// `("1234500000000000000", 18)` -> `"1.2345"`. The amount is treated as an
/// arbitrary-precision unsigned integer; floats cannot represent 18-decimal
/// token amounts exactly. Malformed input is returned unchanged, the value is
/// display-only.
pub fn to_display_amount(raw: &str, decimals: u32) -> String {
    let Ok(n) = U256::from_dec_str(raw) else {
        return raw.to_string();
    };
    let Some(divisor) = U256::from(10).checked_pow(U256::from(decimals)) else {
        return raw.to_string();
    };
    let (whole, frac) = n.div_mod(divisor);
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    let frac_str = frac_str.trim_end_matches('0');
    format!("{whole}.{frac_str}")
}

/// Shortens an address to `first 6 + … + last 4` so full account identifiers
/// are not exposed in shared chat channels. Short identifiers pass through.
pub fn mask_address(addr: &str) -> String {
    let chars: Vec<char> = addr.chars().collect();
    if chars.len() <= 10 {
        return addr.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Currency display with thousands grouping. `None` in, `None` out.
/// IDR is rendered without sub-units, everything else with two.
pub fn format_currency(amount: Option<Decimal>, currency: &str) -> Option<String> {
    let amount = amount?;
    let (symbol, dp): (&str, usize) = match currency {
        "USD" => ("$", 2),
        "IDR" => ("Rp ", 0),
        _ => ("", 2),
    };
    let amount = amount.round_dp_with_strategy(dp as u32, RoundingStrategy::MidpointAwayFromZero);
    let rendered = format!("{amount:.dp$}");
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rendered.as_str(), None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };
    let grouped = group_thousands(digits);
    let mut out = if symbol.is_empty() {
        format!("{currency} {sign}{grouped}")
    } else {
        format!("{sign}{symbol}{grouped}")
    };
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let len = digits.len();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
