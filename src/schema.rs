//! The one ordered list of model inputs. Assembly, training and inference all
//! build vectors through this table, so field order cannot drift between them.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::fixture_features::FixtureFeatureSet;
use crate::player_features::PlayerFeatureSet;

#[derive(Clone, Copy)]
pub enum FieldSource {
    Player(fn(&PlayerFeatureSet) -> f64),
    Fixture(fn(&FixtureFeatureSet) -> f64),
}

#[derive(Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub source: FieldSource,
}

impl FieldSpec {
    fn read(&self, player: &PlayerFeatureSet, fixture: &FixtureFeatureSet) -> f64 {
        match self.source {
            FieldSource::Player(get) => get(player),
            FieldSource::Fixture(get) => get(fixture),
        }
    }
}

const fn player(name: &'static str, get: fn(&PlayerFeatureSet) -> f64) -> FieldSpec {
    FieldSpec {
        name,
        source: FieldSource::Player(get),
    }
}

const fn fixture(name: &'static str, get: fn(&FixtureFeatureSet) -> f64) -> FieldSpec {
    FieldSpec {
        name,
        source: FieldSource::Fixture(get),
    }
}

// Outcome fields (actual_*) stay out: they are unknown at inference time.
pub static FIELD_SCHEMA: &[FieldSpec] = &[
    player("recent_form_score", |p| p.recent_form_score),
    player("price_performance_ratio", |p| p.price_performance_ratio),
    player("consistency_score", |p| p.consistency_score),
    player("upcoming_difficulty", |p| p.upcoming_difficulty),
    player("goal_contribution_rate", |p| p.goal_contribution_rate),
    player("xg_overperformance", |p| p.xg_overperformance),
    player("xa_overperformance", |p| p.xa_overperformance),
    player("home_away_performance_delta", |p| p.home_away_performance_delta),
    player("form_trend", |p| p.form_trend),
    player("season_on_season_improvement", |p| p.season_on_season_improvement),
    player("injury_proneness", |p| p.injury_proneness),
    player("price_change_resilience", |p| p.price_change_resilience),
    player("team_performance_impact", |p| p.team_performance_impact),
    player("difficulty_adjusted_performance", |p| p.difficulty_adjusted_performance),
    player("clean_sheet_contribution", |p| p.clean_sheet_contribution),
    player("save_percentage", |p| p.save_percentage),
    player("bonus_points_per_game", |p| p.bonus_points_per_game),
    player("current_price", |p| p.current_price),
    fixture("home_attack", |f| f.home_attack),
    fixture("home_defence", |f| f.home_defence),
    fixture("away_attack", |f| f.away_attack),
    fixture("away_defence", |f| f.away_defence),
    fixture("strength_difference", |f| f.strength_difference),
    fixture("expected_goals", |f| f.expected_goals),
    fixture("home_factor", |f| f.home_factor),
    fixture("away_factor", |f| f.away_factor),
    fixture("home_clean_sheet_probability", |f| f.home_clean_sheet_probability),
    fixture("away_clean_sheet_probability", |f| f.away_clean_sheet_probability),
    fixture("expected_cards", |f| f.expected_cards),
    fixture("is_derby", |f| if f.is_derby { 1.0 } else { 0.0 }),
];

static FIELD_NAMES: Lazy<Vec<&'static str>> =
    Lazy::new(|| FIELD_SCHEMA.iter().map(|f| f.name).collect());

static FINGERPRINT: Lazy<String> = Lazy::new(|| FIELD_NAMES.join(","));

pub fn field_schema() -> &'static [&'static str] {
    &FIELD_NAMES
}

pub fn schema_fingerprint() -> &'static str {
    &FINGERPRINT
}

/// Values laid out exactly as `field_schema()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn check_len(&self) -> Result<(), PipelineError> {
        if self.values.len() != FIELD_SCHEMA.len() {
            return Err(PipelineError::SchemaMismatch {
                expected: format!("{} fields", FIELD_SCHEMA.len()),
                found: format!("{} fields", self.values.len()),
            });
        }
        Ok(())
    }
}

pub fn feature_vector(player: &PlayerFeatureSet, fixture: &FixtureFeatureSet) -> FeatureVector {
    FeatureVector {
        values: FIELD_SCHEMA
            .iter()
            .map(|spec| spec.read(player, fixture))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::fixture_features::derive_fixture_features;
    use crate::player_features::{DEFAULT_UPCOMING_WINDOW, derive_player_features};

    #[test]
    fn names_are_unique() {
        let unique: HashSet<_> = field_schema().iter().collect();
        assert_eq!(unique.len(), FIELD_SCHEMA.len());
    }

    #[test]
    fn vector_follows_schema_order() {
        let raw_player = serde_json::from_str(
            r#"{"id":1,"now_cost":5.5,"history":[{"round":1,"minutes":90,"total_points":7}]}"#,
        )
        .unwrap();
        let raw_fixture =
            serde_json::from_str(r#"{"id":2,"team_h":1,"team_a":2}"#).unwrap();
        let p = derive_player_features(&raw_player, &HashMap::new(), DEFAULT_UPCOMING_WINDOW);
        let f = derive_fixture_features(&raw_fixture, &HashMap::new());

        let v = feature_vector(&p, &f);
        assert!(v.check_len().is_ok());
        let idx = |name: &str| field_schema().iter().position(|n| *n == name).unwrap();
        assert_eq!(v.values[idx("recent_form_score")], 7.0);
        assert_eq!(v.values[idx("current_price")], 5.5);
        assert_eq!(v.values[idx("expected_goals")], f.expected_goals);
    }

    #[test]
    fn short_vector_is_rejected() {
        let v = FeatureVector {
            values: vec![0.0; 3],
        };
        assert!(matches!(
            v.check_len(),
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn fingerprint_joins_names() {
        assert!(schema_fingerprint().starts_with("recent_form_score,"));
        assert!(schema_fingerprint().ends_with(",is_derby"));
    }
}
