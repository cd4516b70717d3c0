//! Temporal state decay - pure functions for how character states change
//! between scenes.
//!
//! Clothing, hair, accessories, carried items, relationship context, and
//! in-scene location persist until explicitly changed.

use atelier_protocol::{BodyState, CharacterSceneState, EnergyLevel, Injury, InjurySeverity};

/// Emotion steps one notch toward calm per scene. Unknown words map to
/// calm.
const EMOTION_DECAY: &[(&str, &str)] = &[
    ("furious", "angry"),
    ("angry", "irritated"),
    ("irritated", "calm"),
    ("threatening", "irritated"),
    ("nervous", "uneasy"),
    ("uneasy", "calm"),
    ("ecstatic", "happy"),
    ("happy", "content"),
    ("content", "calm"),
    ("terrified", "scared"),
    ("scared", "anxious"),
    ("anxious", "calm"),
    ("devastated", "sad"),
    ("sad", "melancholy"),
    ("melancholy", "calm"),
    ("shocked", "surprised"),
    ("surprised", "calm"),
    ("disgusted", "uncomfortable"),
    ("uncomfortable", "calm"),
    ("embarrassed", "uncomfortable"),
    ("determined", "focused"),
    ("focused", "calm"),
    ("serene", "calm"),
    ("calm", "calm"),
];

/// Decay one injury by one scene step. Returns `None` once healed.
pub fn decay_injury(injury: &Injury) -> Option<Injury> {
    match injury.severity {
        InjurySeverity::Permanent => return Some(injury.clone()),
        InjurySeverity::Healed => return None,
        _ => {}
    }

    let countdown = injury.countdown - 1;
    if countdown > 0 {
        return Some(Injury {
            countdown,
            ..injury.clone()
        });
    }

    let next = match injury.severity {
        InjurySeverity::Severe => InjurySeverity::Moderate,
        InjurySeverity::Moderate => InjurySeverity::Minor,
        InjurySeverity::Minor => return None,
        InjurySeverity::Healed | InjurySeverity::Permanent => unreachable!(),
    };
    Some(Injury {
        severity: next,
        countdown: Injury::default_countdown(),
        ..injury.clone()
    })
}

/// Decay all injuries, dropping healed ones.
pub fn decay_injuries(injuries: &[Injury]) -> Vec<Injury> {
    injuries.iter().filter_map(decay_injury).collect()
}

/// One step toward calm.
pub fn decay_emotion(emotional_state: &str) -> String {
    EMOTION_DECAY
        .iter()
        .find(|(from, _)| *from == emotional_state)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| "calm".to_string())
}

/// One step along the body-state chain.
pub fn decay_body_state(body_state: BodyState) -> BodyState {
    match body_state {
        BodyState::Wet => BodyState::Damp,
        BodyState::Damp => BodyState::Dry,
        BodyState::Dry => BodyState::Clean,
        BodyState::Bloody => BodyState::Stained,
        BodyState::Stained => BodyState::Clean,
        BodyState::Dirty => BodyState::Dusty,
        BodyState::Dusty => BodyState::Clean,
        BodyState::Sweaty => BodyState::Clean,
        BodyState::Clean => BodyState::Clean,
    }
}

/// One step toward normal.
pub fn decay_energy(energy: EnergyLevel) -> EnergyLevel {
    match energy {
        EnergyLevel::Exhausted => EnergyLevel::Tired,
        EnergyLevel::Tired => EnergyLevel::Normal,
        EnergyLevel::Hyperactive => EnergyLevel::Energized,
        EnergyLevel::Energized => EnergyLevel::Normal,
        EnergyLevel::Normal => EnergyLevel::Normal,
    }
}

/// Apply every decay rule once. The persistent fields pass through
/// untouched.
pub fn apply_decay(state: &CharacterSceneState) -> CharacterSceneState {
    CharacterSceneState {
        injuries: decay_injuries(&state.injuries),
        emotional_state: decay_emotion(&state.emotional_state),
        body_state: decay_body_state(state.body_state),
        energy_level: decay_energy(state.energy_level),
        ..state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injury(severity: InjurySeverity, countdown: i32) -> Injury {
        Injury {
            injury_type: "cut".to_string(),
            severity,
            location: Some("left arm".to_string()),
            countdown,
        }
    }

    #[test]
    fn test_injury_countdown_then_step() {
        // countdown 2 -> 1, severity unchanged.
        let first = decay_injury(&injury(InjurySeverity::Severe, 2)).unwrap();
        assert_eq!(first.severity, InjurySeverity::Severe);
        assert_eq!(first.countdown, 1);

        // countdown hits zero: one severity step, countdown resets.
        let second = decay_injury(&first).unwrap();
        assert_eq!(second.severity, InjurySeverity::Moderate);
        assert_eq!(second.countdown, 2);
    }

    #[test]
    fn test_minor_injury_heals_away() {
        let almost = injury(InjurySeverity::Minor, 1);
        assert!(decay_injury(&almost).is_none());
    }

    #[test]
    fn test_permanent_is_fixed_point() {
        let scar = injury(InjurySeverity::Permanent, 1);
        let mut current = scar.clone();
        for _ in 0..20 {
            current = decay_injury(&current).unwrap();
        }
        assert_eq!(current, scar);
    }

    #[test]
    fn test_emotion_chains_reach_calm() {
        for start in ["furious", "terrified", "ecstatic", "devastated"] {
            let mut emotion = start.to_string();
            for _ in 0..5 {
                emotion = decay_emotion(&emotion);
            }
            assert_eq!(emotion, "calm", "chain from {start} must settle");
        }
        assert_eq!(decay_emotion("weirdly_specific_mood"), "calm");
    }

    #[test]
    fn test_body_state_chains() {
        assert_eq!(decay_body_state(BodyState::Wet), BodyState::Damp);
        assert_eq!(decay_body_state(BodyState::Damp), BodyState::Dry);
        assert_eq!(decay_body_state(BodyState::Bloody), BodyState::Stained);
        assert_eq!(decay_body_state(BodyState::Stained), BodyState::Clean);
        assert_eq!(decay_body_state(BodyState::Sweaty), BodyState::Clean);
        assert_eq!(decay_body_state(BodyState::Clean), BodyState::Clean);
    }

    #[test]
    fn test_n_step_equivalence() {
        // Applying decay N times walks each chain N steps.
        let mut state = CharacterSceneState::new("s1", "hero");
        state.emotional_state = "furious".to_string();
        state.body_state = BodyState::Wet;
        state.energy_level = EnergyLevel::Exhausted;
        state.clothing = Some("travel cloak".to_string());
        state.carrying = vec!["lantern".to_string()];

        let after_two = apply_decay(&apply_decay(&state));
        assert_eq!(after_two.emotional_state, "irritated");
        assert_eq!(after_two.body_state, BodyState::Dry);
        assert_eq!(after_two.energy_level, EnergyLevel::Normal);
        // Persistent fields never decay.
        assert_eq!(after_two.clothing.as_deref(), Some("travel cloak"));
        assert_eq!(after_two.carrying, vec!["lantern"]);

        let after_many = (0..10).fold(state.clone(), |s, _| apply_decay(&s));
        assert_eq!(after_many.emotional_state, "calm");
        assert_eq!(after_many.body_state, BodyState::Clean);
        assert_eq!(after_many.energy_level, EnergyLevel::Normal);
    }
}
