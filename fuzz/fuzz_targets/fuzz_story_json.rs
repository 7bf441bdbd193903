#![no_main]

use libfuzzer_sys::fuzz_target;
use telar_core::RuntimeConfig;
use telar_core::input::InputEvent;
use telar_core::model::{ObjectIndex, Story};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Cap length to keep fuzzing fast.
    if text.len() > 4096 {
        return;
    }

    // Split into steps / objects halves at the first NUL, if any.
    let (steps, objects) = text.split_once('\0').unwrap_or((text, "[]"));

    // Loading must never panic; a loaded story must be valid.
    if let Ok(story) = Story::from_json(steps, objects) {
        assert!(!story.is_empty(), "loaded story has no steps");
        assert!(story.validate().is_empty());
        for step in &story.steps {
            // Resolving a view must never panic.
            let _ = step.view_spec();
            if let Some(id) = step.object_id() {
                assert_eq!(id, id.trim(), "object id not trimmed");
            }
        }
    }

    if let Ok(config) = RuntimeConfig::from_json_str(text) {
        assert!(config.validate().is_empty());
        assert!(config.pool.max_cards > 0);
    }

    let _ = ObjectIndex::from_json_str(text);
    let _ = serde_json::from_str::<InputEvent>(text);
});
