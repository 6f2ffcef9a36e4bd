//! Entry fees and bot constraints per competition.

use crate::models::CompetitionType;

/// Entry fee in whole rupees.
pub fn price_of(competition: CompetitionType) -> i64 {
    match competition {
        CompetitionType::Robowars => 300,
        CompetitionType::Roborace => 200,
        CompetitionType::Robosoccer => 200,
    }
}

/// Weight ceiling in kilograms.
pub fn max_weight_of(competition: CompetitionType) -> f64 {
    match competition {
        CompetitionType::Robowars => 8.0,
        CompetitionType::Roborace => 5.0,
        CompetitionType::Robosoccer => 3.0,
    }
}

pub fn validate_weight(weight: f64, competition: CompetitionType) -> bool {
    weight.is_finite() && weight > 0.0 && weight <= max_weight_of(competition)
}

pub fn display_name(competition: CompetitionType) -> &'static str {
    match competition {
        CompetitionType::Robowars => "RoboWars",
        CompetitionType::Roborace => "RoboRace",
        CompetitionType::Robosoccer => "RoboSoccer",
    }
}

/// Combat bots must declare a weapon.
pub fn requires_weapon(competition: CompetitionType) -> bool {
    competition == CompetitionType::Robowars
}

/// Accepts `L x W x H` with `x`, `X` or `×` separators and positive numeric parts.
pub fn validate_dimensions(dimensions: &str) -> bool {
    let parts: Vec<&str> = dimensions
        .split(&['x', 'X', '×'][..])
        .map(str::trim)
        .collect();

    parts.len() == 3
        && parts.iter().all(|p| {
            let numeric = p.trim_end_matches(|c: char| c.is_ascii_alphabetic()).trim();
            numeric
                .parse::<f64>()
                .map(|v| v.is_finite() && v > 0.0)
                .unwrap_or(false)
        })
}
