//! End-to-end propagation and invalidation scenarios.

use atelier_catalog::{CatalogStore, ProjectUpsert};
use atelier_narrative::{NarrativeEngine, NarrativeEvent, NarrativeHooks};
use atelier_protocol::{BodyState, Scene, Shot, StatePatch, StateSource};

async fn project_with_scenes(count: i64) -> CatalogStore {
    let store = CatalogStore::memory().await.unwrap();
    store
        .projects()
        .upsert(ProjectUpsert {
            id: Some("p1".to_string()),
            name: "P1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    for n in 1..=count {
        store
            .scenes()
            .upsert_scene(&Scene {
                id: format!("s{n}"),
                project_id: "p1".to_string(),
                scene_number: n,
                title: Some(format!("Scene {n}")),
                description: Some("rain over the harbor".to_string()),
                location: None,
                mood: None,
                time_of_day: None,
                weather: None,
                narrative_text: None,
                generation_status: None,
                output_video_path: None,
                dialogue_audio_path: None,
            })
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn propagation_respects_manual_override() {
    let store = project_with_scenes(5).await;
    let engine = NarrativeEngine::new(store.clone(), None);

    // Scene 1: hero is furious and soaked.
    engine
        .set_state(
            "s1",
            "hero",
            &StatePatch {
                emotional_state: Some("furious".to_string()),
                body_state: Some(BodyState::Wet),
                ..Default::default()
            },
            StateSource::Manual,
        )
        .await
        .unwrap();

    // Scene 3: a manual override says the hero is bloody there.
    engine
        .set_state(
            "s3",
            "hero",
            &StatePatch {
                body_state: Some(BodyState::Bloody),
                ..Default::default()
            },
            StateSource::Manual,
        )
        .await
        .unwrap();

    let written = engine.propagate_forward("s1", "p1").await.unwrap();
    // Scenes 2, 4, 5 were written; scene 3 was left to its manual row.
    assert_eq!(written.len(), 3);

    let s2 = engine.get_state("s2", "hero").await.unwrap().unwrap();
    assert_eq!(s2.emotional_state, "angry");
    assert_eq!(s2.body_state, BodyState::Damp);
    assert_eq!(s2.state_source, StateSource::Propagated);

    // The manual row is untouched.
    let s3 = engine.get_state("s3", "hero").await.unwrap().unwrap();
    assert_eq!(s3.body_state, BodyState::Bloody);
    assert_eq!(s3.state_source, StateSource::Manual);

    // Scenes 4 and 5 continue from the manual values.
    let s4 = engine.get_state("s4", "hero").await.unwrap().unwrap();
    assert_eq!(s4.emotional_state, "irritated");
    assert_eq!(s4.body_state, BodyState::Stained);

    let s5 = engine.get_state("s5", "hero").await.unwrap().unwrap();
    assert_eq!(s5.emotional_state, "calm");
    assert_eq!(s5.body_state, BodyState::Clean);
}

#[tokio::test]
async fn repropagation_is_idempotent_modulo_versions() {
    let store = project_with_scenes(3).await;
    let engine = NarrativeEngine::new(store.clone(), None);

    engine
        .set_state(
            "s1",
            "hero",
            &StatePatch {
                emotional_state: Some("furious".to_string()),
                ..Default::default()
            },
            StateSource::Manual,
        )
        .await
        .unwrap();

    engine.propagate_forward("s1", "p1").await.unwrap();
    let first: Vec<_> = engine
        .get_state_timeline("p1", "hero")
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.scene_id.clone(), s.emotional_state.clone(), s.version))
        .collect();

    engine.propagate_forward("s1", "p1").await.unwrap();
    let second: Vec<_> = engine
        .get_state_timeline("p1", "hero")
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.scene_id.clone(), s.emotional_state.clone(), s.version))
        .collect();

    // Same values everywhere; only versions of touched non-manual rows
    // moved.
    assert_eq!(first.len(), second.len());
    for ((scene_a, emotion_a, version_a), (scene_b, emotion_b, version_b)) in
        first.iter().zip(second.iter())
    {
        assert_eq!(scene_a, scene_b);
        assert_eq!(emotion_a, emotion_b);
        if scene_a == "s1" {
            assert_eq!(version_a, version_b);
        } else {
            assert_eq!(version_a + 1, *version_b);
        }
    }
}

#[tokio::test]
async fn version_strictly_monotonic_per_row() {
    let store = project_with_scenes(1).await;
    let engine = NarrativeEngine::new(store.clone(), None);

    let mut last_version = 0;
    for emotion in ["calm", "angry", "furious"] {
        let state = engine
            .set_state(
                "s1",
                "hero",
                &StatePatch {
                    emotional_state: Some(emotion.to_string()),
                    ..Default::default()
                },
                StateSource::Manual,
            )
            .await
            .unwrap();
        assert!(state.version > last_version);
        last_version = state.version;
    }
    assert!(last_version >= 1);
}

#[tokio::test]
async fn scene_edit_invalidates_downstream_exactly_once() {
    let store = project_with_scenes(5).await;
    let engine = NarrativeEngine::new(store.clone(), None);

    engine
        .set_state(
            "s1",
            "hero",
            &StatePatch {
                emotional_state: Some("furious".to_string()),
                ..Default::default()
            },
            StateSource::Manual,
        )
        .await
        .unwrap();

    // Rendered shots in scenes 2..5.
    for n in 2..=5 {
        store
            .scenes()
            .upsert_shot(&Shot {
                id: format!("sh{n}"),
                scene_id: format!("s{n}"),
                shot_number: 1,
                shot_type: None,
                camera_angle: None,
                motion_prompt: None,
                characters_present: vec!["hero".to_string()],
                dialogue_text: None,
                dialogue_character: None,
                status: Some("completed".to_string()),
                output_video_path: Some(format!("/out/sh{n}.mp4")),
            })
            .await
            .unwrap();
    }

    let hooks = NarrativeHooks::new(store.clone(), NarrativeEngine::new(store.clone(), None));
    let event = NarrativeEvent::SceneUpdated {
        scene_id: "s1".to_string(),
        changed_fields: vec!["description".to_string()],
    };

    let outcome = hooks.handle(event.clone()).await.unwrap();
    assert_eq!(outcome.regenerations_enqueued, 4);

    let pending = store.narrative().list_regeneration_pending("p1").await.unwrap();
    assert_eq!(pending.len(), 4);
    for entry in &pending {
        assert_eq!(entry.priority, 3);
        assert_eq!(entry.source_scene_id.as_deref(), Some("s1"));
        assert_eq!(entry.reason, "upstream scene edited");
    }

    // Double delivery adds nothing.
    let outcome = hooks.handle(event).await.unwrap();
    assert_eq!(outcome.regenerations_enqueued, 0);
    assert_eq!(
        store
            .narrative()
            .list_regeneration_pending("p1")
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn shot_edit_enqueues_high_priority() {
    let store = project_with_scenes(1).await;
    store
        .scenes()
        .upsert_shot(&Shot {
            id: "sh1".to_string(),
            scene_id: "s1".to_string(),
            shot_number: 1,
            shot_type: Some("wide".to_string()),
            camera_angle: None,
            motion_prompt: Some("pan left".to_string()),
            characters_present: vec![],
            dialogue_text: None,
            dialogue_character: None,
            status: Some("completed".to_string()),
            output_video_path: Some("/out/sh1.mp4".to_string()),
        })
        .await
        .unwrap();

    let hooks = NarrativeHooks::new(store.clone(), NarrativeEngine::new(store.clone(), None));

    // Cosmetic change: no invalidation.
    let outcome = hooks
        .handle(NarrativeEvent::ShotUpdated {
            shot_id: "sh1".to_string(),
            changed_fields: vec!["status".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(outcome.regenerations_enqueued, 0);

    // Content change: priority-5 entry.
    let outcome = hooks
        .handle(NarrativeEvent::ShotUpdated {
            shot_id: "sh1".to_string(),
            changed_fields: vec!["motion_prompt".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(outcome.regenerations_enqueued, 1);

    let pending = store.narrative().list_regeneration_pending("p1").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].priority, 5);
    assert_eq!(pending[0].shot_id.as_deref(), Some("sh1"));
}

#[tokio::test]
async fn manual_state_update_triggers_propagation() {
    let store = project_with_scenes(3).await;
    let engine = NarrativeEngine::new(store.clone(), None);
    engine
        .set_state(
            "s1",
            "hero",
            &StatePatch {
                body_state: Some(BodyState::Dirty),
                ..Default::default()
            },
            StateSource::Manual,
        )
        .await
        .unwrap();

    let hooks = NarrativeHooks::new(store.clone(), NarrativeEngine::new(store.clone(), None));
    let outcome = hooks
        .handle(NarrativeEvent::StateUpdated {
            scene_id: "s1".to_string(),
            source: StateSource::Manual,
        })
        .await
        .unwrap();
    assert_eq!(outcome.propagated_states, 2);

    let s2 = engine.get_state("s2", "hero").await.unwrap().unwrap();
    assert_eq!(s2.body_state, BodyState::Dusty);

    // Non-manual sources do not ripple.
    let outcome = hooks
        .handle(NarrativeEvent::StateUpdated {
            scene_id: "s1".to_string(),
            source: StateSource::Propagated,
        })
        .await
        .unwrap();
    assert_eq!(outcome.propagated_states, 0);
}
