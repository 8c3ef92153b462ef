// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! US state names.

const US_STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("PR", "Puerto Rico"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

pub const UNITED_STATES: &str = "United States";

/// `United States` for any spelling of `USA`, otherwise the input.
pub fn normalize_country(country: &str) -> String {
    let trimmed = country.trim();
    if trimmed.eq_ignore_ascii_case("usa") {
        UNITED_STATES.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn is_united_states(country: Option<&str>) -> bool {
    country.is_some_and(|c| {
        let c = c.trim();
        c.eq_ignore_ascii_case(UNITED_STATES)
            || c.eq_ignore_ascii_case("usa")
            || c.eq_ignore_ascii_case("united states of america")
    })
}

/// Full state name for an abbreviation or case variant, when the country is
/// the United States. Anything unrecognised comes back trimmed.
pub fn normalize_us_state(state: &str, country: Option<&str>) -> String {
    let trimmed = state.trim();
    if !is_united_states(country) {
        return trimmed.to_string();
    }
    let key = trimmed.trim_end_matches('.').replace('.', "");
    US_STATES
        .iter()
        .find(|(code, name)| code.eq_ignore_ascii_case(&key) || name.eq_ignore_ascii_case(trimmed))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
