use checkout_common::is_valid_currency_code;

const EURO_AREA: &[&str] = &[
    "AT", "BE", "CY", "DE", "EE", "ES", "FI", "FR", "GR", "HR", "IE", "IT", "LT", "LU", "LV", "MT", "NL", "PT", "SI",
    "SK",
];

/// Infers the settlement currency for a buyer's country. Accepts ISO-3166 alpha-2 or alpha-3 codes.
pub fn currency_for_country(country: &str) -> Option<&'static str> {
    let country = country.trim().to_ascii_uppercase();
    let alpha2 = match country.as_str() {
        "USA" => "US",
        "CAN" => "CA",
        "GBR" => "GB",
        "AUS" => "AU",
        "NZL" => "NZ",
        "DEU" => "DE",
        "FRA" => "FR",
        "ESP" => "ES",
        "ITA" => "IT",
        "NLD" => "NL",
        "IRL" => "IE",
        s => s,
    };
    match alpha2 {
        "US" | "PR" => Some("USD"),
        "CA" => Some("CAD"),
        "GB" => Some("GBP"),
        "AU" => Some("AUD"),
        "NZ" => Some("NZD"),
        c if EURO_AREA.contains(&c) => Some("EUR"),
        _ => None,
    }
}

/// Resolves the effective currency: an explicit (valid) override first, then the buyer's country, then the stored
/// value.
pub fn effective_currency(explicit: Option<&str>, country: Option<&str>, stored: &str) -> String {
    explicit
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| is_valid_currency_code(c))
        .or_else(|| country.and_then(currency_for_country).map(String::from))
        .unwrap_or_else(|| stored.to_string())
}
